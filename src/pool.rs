//! Worker pool
//! 有界工作池：固定数量的执行槽位 + FIFO 等待队列
//!
//! 提交顺序即执行顺序：单个分发循环按 FIFO 从队列取任务，拿到槽位（信号量许可）后再派发到独立的 tokio 任务。
//! 每个提交者通过 `Ticket` 只能等待自己的结果。
//! 任务 panic 只会结束所在的 tokio 任务，许可随之释放，池本身不受影响。

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{RswResult, RswappalyzerError};

type Job = BoxFuture<'static, ()>;

/// 工作池容量上限，保证许可数能完整收回
pub const MAX_CAPACITY: usize = u16::MAX as usize;

/// 提交凭证：等待对应任务的结果
#[derive(Debug)]
pub struct Ticket<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Ticket<T> {
    /// 等待任务完成；任务 panic 时返回 `InternalFault`
    ///
    /// 丢弃 Ticket 不会取消任务，任务仍会执行完毕
    pub async fn wait(self) -> RswResult<T> {
        self.receiver.await.map_err(|_| {
            RswappalyzerError::InternalFault("pool job terminated without a result".to_string())
        })
    }
}

struct PoolInner {
    capacity: usize,
    max_queue_depth: Option<usize>,
    semaphore: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    submitted: AtomicU64,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// 有界工作池，克隆后共享同一组槽位
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity())
            .field("active", &self.active())
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl WorkerPool {
    /// 创建工作池，需在 tokio 运行时内调用
    ///
    /// `capacity` 限定在 1..=MAX_CAPACITY；`max_queue_depth` 为 None 时队列不设上限
    pub fn new(capacity: usize, max_queue_depth: Option<usize>) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY);
        let semaphore = Arc::new(Semaphore::new(capacity));
        let queued = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::unbounded_channel();

        let dispatcher = tokio::spawn(dispatch_loop(
            receiver,
            Arc::clone(&semaphore),
            Arc::clone(&queued),
        ));
        debug!("工作池已创建：容量={}，队列上限={:?}", capacity, max_queue_depth);

        Self {
            inner: Arc::new(PoolInner {
                capacity,
                max_queue_depth,
                semaphore,
                queued,
                submitted: AtomicU64::new(0),
                sender: Mutex::new(Some(sender)),
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }

    /// 提交任务，立即返回凭证
    pub fn submit<F, T>(&self, job: F) -> RswResult<Ticket<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        // 持锁完成检查与入队，保证队列上限判断不被并发提交穿透
        let guard = lock(&self.inner.sender);
        let sender = guard.as_ref().ok_or(RswappalyzerError::PoolClosed)?;

        if let Some(limit) = self.inner.max_queue_depth {
            if self.queued() >= limit {
                return Err(RswappalyzerError::PoolSaturated(limit));
            }
        }

        let (tx, rx) = oneshot::channel();
        let task: Job = Box::pin(async move {
            // 接收方已放弃等待时结果直接丢弃
            let _ = tx.send(job.await);
        });

        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send(task).is_err() {
            self.inner.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(RswappalyzerError::PoolClosed);
        }
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);

        Ok(Ticket { receiver: rx })
    }

    /// 提交并等待结果
    pub async fn run<F, T>(&self, job: F) -> RswResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(job)?.wait().await
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// 正在执行的任务数
    pub fn active(&self) -> usize {
        self.inner.capacity - self.inner.semaphore.available_permits()
    }

    /// 等待槽位的任务数
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::SeqCst)
    }

    /// 累计接受的任务数
    pub fn submitted(&self) -> u64 {
        self.inner.submitted.load(Ordering::Relaxed)
    }

    /// 停止接收新任务，已入队的任务继续执行
    pub fn close(&self) {
        if lock(&self.inner.sender).take().is_some() {
            info!("工作池已关闭，剩余排队任务{}个", self.queued());
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.sender).is_none()
    }

    /// 关闭并等待所有已接受的任务完成
    pub async fn shutdown(&self) {
        self.close();

        let dispatcher = lock(&self.inner.dispatcher).take();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }

        // 收回全部许可即代表没有任务在执行
        let _drained = self
            .inner
            .semaphore
            .acquire_many(self.inner.capacity as u32)
            .await;
        info!("工作池已排空，累计处理任务{}个", self.submitted());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 分发循环：按入队顺序逐个等待槽位
async fn dispatch_loop(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    semaphore: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
) {
    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        queued.fetch_sub(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let _permit = permit;
            job.await;
        });
    }
    debug!("工作池分发循环退出");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn explode() -> usize {
        panic!("job exploded")
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let pool = WorkerPool::new(3, None);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tickets: Vec<_> = (0..12)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        for ticket in tickets {
            ticket.wait().await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(pool.submitted(), 12);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_capacity_is_clamped() {
        assert_eq!(WorkerPool::new(0, None).capacity(), 1);

        let pool = WorkerPool::new(usize::MAX, None);
        assert_eq!(pool.capacity(), MAX_CAPACITY);
        assert_eq!(pool.submit(async { 7 }).unwrap().wait().await.unwrap(), 7);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_fifo_order_with_single_slot() {
        let pool = WorkerPool::new(1, None);
        let order = Arc::new(Mutex::new(Vec::new()));

        let tickets: Vec<_> = (0..6)
            .map(|i| {
                let order = Arc::clone(&order);
                pool.submit(async move {
                    sleep(Duration::from_millis(2)).await;
                    order.lock().unwrap().push(i);
                })
                .unwrap()
            })
            .collect();

        for ticket in tickets {
            ticket.wait().await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_each_caller_gets_its_own_result() {
        let pool = WorkerPool::new(4, None);

        let callers: Vec<_> = (0..40u64)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    pool.run(async move {
                        sleep(Duration::from_millis(i % 7)).await;
                        i * 2
                    })
                    .await
                })
            })
            .collect();

        for (i, caller) in callers.into_iter().enumerate() {
            assert_eq!(caller.await.unwrap().unwrap(), i as u64 * 2);
        }
    }

    #[tokio::test]
    async fn test_close_rejects_new_work_and_drains_queue() {
        let pool = WorkerPool::new(1, None);
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let blocker = pool
            .submit(async move {
                let _ = gate_rx.await;
                "first"
            })
            .unwrap();
        let queued: Vec<_> = (0..3usize).map(|i| pool.submit(async move { i }).unwrap()).collect();

        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(
            pool.submit(async { 99 }),
            Err(RswappalyzerError::PoolClosed)
        ));

        gate_tx.send(()).unwrap();
        assert_eq!(blocker.wait().await.unwrap(), "first");
        for (i, ticket) in queued.into_iter().enumerate() {
            assert_eq!(ticket.wait().await.unwrap(), i);
        }

        pool.shutdown().await;
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.submitted(), 4);
    }

    #[tokio::test]
    async fn test_queue_depth_limit() {
        let pool = WorkerPool::new(1, Some(2));
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let blocker = pool
            .submit(async move {
                let _ = gate_rx.await;
            })
            .unwrap();
        wait_until(|| pool.active() == 1 && pool.queued() == 0).await;

        let waiting: Vec<_> = (0..2).map(|_| pool.submit(async {}).unwrap()).collect();
        assert_eq!(pool.queued(), 2);
        assert!(matches!(
            pool.submit(async {}),
            Err(RswappalyzerError::PoolSaturated(2))
        ));

        gate_tx.send(()).unwrap();
        blocker.wait().await.unwrap();
        for ticket in waiting {
            ticket.wait().await.unwrap();
        }
        assert!(pool.submit(async {}).is_ok());
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_poison_pool() {
        let pool = WorkerPool::new(1, None);

        let err = pool.run(explode()).await.unwrap_err();
        assert!(matches!(err, RswappalyzerError::InternalFault(_)));

        assert_eq!(pool.run(async { 7 }).await.unwrap(), 7);
        wait_until(|| pool.active() == 0).await;
    }

    #[tokio::test]
    async fn test_abandoned_ticket_still_runs() {
        let pool = WorkerPool::new(2, None);
        let done = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&done);
        drop(
            pool.submit(async move {
                sleep(Duration::from_millis(10)).await;
                flag.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap(),
        );

        wait_until(|| done.load(Ordering::SeqCst) == 1).await;
    }
}

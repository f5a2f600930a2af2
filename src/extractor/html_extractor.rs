//! HTML标签提取器
//! 基于 html5ever 流式分词，提取 script-src 与 meta 标签

use std::cell::RefCell;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts
};
use markup5ever::interface::Attribute;
use tendril::StrTendril;

/// 从页面中提取到的检测信号
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageSignals {
    pub script_srcs: Vec<String>,
    /// (name/property/http-equiv 小写, content)
    pub meta_tags: Vec<(String, String)>,
}

/// 分词回调：只关心 script / meta 起始标签
#[derive(Default)]
struct SignalSink {
    script_srcs: RefCell<Vec<String>>,
    meta_tags: RefCell<Vec<(String, String)>>,
}

impl TokenSink for SignalSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line: u64) -> TokenSinkResult<()> {
        if let Token::TagToken(Tag {
            kind: TagKind::StartTag,
            name,
            attrs,
            self_closing,
        }) = token
        {
            match name.as_ref() {
                "script" => {
                    self.collect_script_src(&attrs);
                    // 脚本内容按原始文本处理，避免 `a<b` 之类的代码被当作标签
                    if !self_closing {
                        return TokenSinkResult::RawData(RawKind::ScriptData);
                    }
                }
                "style" if !self_closing => return TokenSinkResult::RawData(RawKind::Rawtext),
                "meta" => self.collect_meta(&attrs),
                _ => {}
            }
        }
        TokenSinkResult::Continue
    }
}

impl SignalSink {
    fn collect_script_src(&self, attrs: &[Attribute]) {
        if let Some(src) = attrs.iter().find(|attr| attr.name.local.as_ref() == "src") {
            let src = src.value.trim();
            if !src.is_empty() {
                self.script_srcs.borrow_mut().push(src.to_string());
            }
        }
    }

    fn collect_meta(&self, attrs: &[Attribute]) {
        let mut key = None;
        let mut content = None;

        for attr in attrs {
            match attr.name.local.as_ref() {
                "name" | "property" | "http-equiv" if key.is_none() => {
                    key = Some(attr.value.to_lowercase())
                }
                "content" => content = Some(attr.value.to_string()),
                _ => {}
            }
        }

        if let (Some(k), Some(c)) = (key, content) {
            self.meta_tags.borrow_mut().push((k, c));
        }
    }

    fn into_signals(self) -> PageSignals {
        PageSignals {
            script_srcs: self.script_srcs.into_inner(),
            meta_tags: self.meta_tags.into_inner(),
        }
    }
}

/// HTML 信号提取器
pub struct HtmlExtractor;

impl HtmlExtractor {
    /// 从HTML字符串提取 script-src 与 meta 标签
    pub fn extract(html: &str) -> PageSignals {
        let tokenizer = Tokenizer::new(SignalSink::default(), TokenizerOpts::default());
        let queue = BufferQueue::default();
        queue.push_back(StrTendril::from(html));

        let _ = tokenizer.feed(&queue);
        tokenizer.end();

        tokenizer.sink.into_signals()
    }
}

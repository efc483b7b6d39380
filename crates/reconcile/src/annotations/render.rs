//! HTML rendering of annotations.
//!
//! Each annotation becomes one block; the blocks are wrapped in a single
//! container. The markup is what the catalog's HTML sanitizer writes back
//! byte-for-byte (no void elements, the same escaping), so a stored block
//! read back out of the catalog keeps its exact bytes.

use super::Annotation;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tracing::instrument;
use upon::{Engine, Template};

const CONTAINER_OPEN: &str = r#"<div class="annotations">"#;
const CONTAINER_CLOSE: &str = "</div>";

const BLOCK_TEMPLATE: &str = concat!(
    r#"<div class="annotation" data-id="{{ id|attr }}" data-source="{{ source }}" data-sort="{{ sort }}" data-timestamp="{{ timestamp }}""#,
    r#"{% if color %} data-color="{{ color|attr }}"{% endif %}>"#,
    r#"<p class="annotation-title">{{ title|html }} <span class="annotation-date">{{ timestamp|datetime }}</span></p>"#,
    r#"<blockquote class="annotation-text">{{ text|html }}</blockquote>"#,
    r#"{% if note %}<p class="annotation-note">{{ note|html }}</p>{% endif %}"#,
    r#"</div>"#,
);

/// Renders annotation blocks and containers.
pub struct Renderer {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl Renderer {
    pub fn new() -> Result<Self> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(BLOCK_TEMPLATE).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }

    /// One annotation block. Identical annotations render to identical bytes.
    #[instrument(level = "trace", skip_all, fields(id = %annotation.id))]
    pub fn block(&self, annotation: &Annotation) -> Result<String> {
        self.template
            .render(&self.engine, Self::parameters(annotation))
            .to_string()
            .or_raise(|| ErrorKind::Template)
    }

    /// Wrap rendered blocks in the container.
    pub fn container<'a>(blocks: impl IntoIterator<Item = &'a str>) -> String {
        let mut html = String::from(CONTAINER_OPEN);
        for block in blocks {
            html.push_str(block);
        }
        html.push_str(CONTAINER_CLOSE);
        html
    }

    fn parameters(annotation: &Annotation) -> upon::Value {
        upon::value! {
            id: &annotation.id,
            source: annotation.source.tag(),
            sort: annotation.sort_key,
            timestamp: annotation.timestamp,
            color: annotation.color.as_deref().filter(|c| !c.is_empty()),
            title: &annotation.title,
            text: normalize(&annotation.text),
            note: annotation.note.as_deref().map(normalize).filter(|n| !n.trim().is_empty()),
        }
    }
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Escaping formatters for text and attribute values, plus epoch formatting.
mod addons {
    use std::fmt::Write;
    use time::OffsetDateTime;
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;
    use upon::{Engine, Value, fmt as upon_fmt};

    const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]");

    fn escape(f: &mut upon_fmt::Formatter<'_>, s: &str, attribute: bool) -> upon_fmt::Result {
        for c in s.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '\u{a0}' => f.write_str("&nbsp;")?,
                '"' if attribute => f.write_str("&quot;")?,
                '<' if !attribute => f.write_str("&lt;")?,
                '>' if !attribute => f.write_str("&gt;")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }

    /// Escapes text content.
    fn html_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => escape(f, s, false)?,
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    /// Escapes a double-quoted attribute value.
    fn attr_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => escape(f, s, true)?,
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    /// Epoch seconds as a UTC `YYYY-MM-DD HH:MM`.
    fn datetime_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        let formatted = match value {
            Value::Integer(ts) => OffsetDateTime::from_unix_timestamp(*ts).ok().and_then(|dt| dt.format(DATETIME_FORMAT).ok()),
            _ => None,
        };
        match formatted {
            Some(s) => write!(f, "{s}")?,
            None => upon_fmt::default(f, value)?,
        };
        Ok(())
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("html", html_formatter);
        engine.add_formatter("attr", attr_formatter);
        engine.add_formatter("datetime", datetime_formatter);
    }
}

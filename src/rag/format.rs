//! Answer rendering

use crate::models::AnswerFormat;
use pulldown_cmark::{html, Event, Options, Parser, TagEnd};

/// Render the model's markdown answer in the requested format
pub fn render_answer(markdown: &str, format: AnswerFormat) -> String {
    match format {
        AnswerFormat::Markdown => markdown.to_string(),
        AnswerFormat::Html => to_html(markdown),
        AnswerFormat::Plain => to_plain(markdown),
    }
}

fn to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn to_plain(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                out.push('\n')
            }
            Event::End(TagEnd::CodeBlock) => out.push('\n'),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```([a-zA-Z0-9_+-]*)\n((?s:.*?))```").expect("code fence pattern is valid")
});

const DEFAULT_CODE_LANGUAGE: &str = "python";
const PLACEHOLDER_PAGE: &str = "# Lesson\nThis lesson content is not available yet.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Text,
    Code,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookPage {
    pub kind: PageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl NotebookPage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: PageKind::Text,
            content: content.into(),
            language: None,
        }
    }

    pub fn code(language: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: PageKind::Code,
            content: content.into(),
            language: Some(language.into()),
        }
    }
}

/// Splits lesson markdown into pages: fenced code blocks become code pages,
/// the prose around them becomes text pages, in source order. The starter
/// code and the lesson goal are appended as their own pages. Never returns an
/// empty list.
pub fn parse_notebook_pages(
    content_md: &str,
    objective: &str,
    code_sample: Option<&str>,
) -> Vec<NotebookPage> {
    let markdown = content_md.trim();
    let mut pages = Vec::new();
    let mut cursor = 0;

    for fence in CODE_FENCE.captures_iter(markdown) {
        let Some(whole) = fence.get(0) else {
            continue;
        };

        let text = markdown.get(cursor..whole.start()).unwrap_or_default().trim();
        if !text.is_empty() {
            pages.push(NotebookPage::text(text));
        }

        let language = fence
            .get(1)
            .map(|m| m.as_str().trim())
            .filter(|language| !language.is_empty())
            .unwrap_or(DEFAULT_CODE_LANGUAGE);
        let code = fence.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if !code.is_empty() {
            pages.push(NotebookPage::code(language, code));
        }

        cursor = whole.end();
    }

    let trailing = markdown.get(cursor..).unwrap_or_default().trim();
    if !trailing.is_empty() {
        pages.push(NotebookPage::text(trailing));
    }

    if let Some(sample) = code_sample.map(str::trim).filter(|s| !s.is_empty()) {
        pages.push(NotebookPage::code(DEFAULT_CODE_LANGUAGE, sample));
    }

    if !objective.trim().is_empty() {
        pages.push(NotebookPage::text(format!("## Lesson Goal\n{objective}")));
    }

    if pages.is_empty() {
        pages.push(NotebookPage::text(PLACEHOLDER_PAGE));
    }

    pages
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageTurn {
    /// Moved to the page at this index.
    Moved(usize),
    /// `next` on the last page: the notebook is finished.
    Completed,
    /// `previous` on the first page.
    Stayed,
}

/// Cursor over already-resolved pages.
pub struct NotebookPager {
    pages: Vec<NotebookPage>,
    index: usize,
    direction: Direction,
    on_complete: Option<Box<dyn FnMut() + Send>>,
}

impl NotebookPager {
    pub fn new(pages: Vec<NotebookPage>) -> Self {
        Self {
            pages,
            index: 0,
            direction: Direction::Forward,
            on_complete: None,
        }
    }

    /// Called whenever `next` is pressed on the last page.
    pub fn with_on_complete(mut self, on_complete: impl FnMut() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(on_complete));
        self
    }

    pub fn next(&mut self) -> PageTurn {
        if self.index + 1 < self.pages.len() {
            self.index += 1;
            self.direction = Direction::Forward;
            PageTurn::Moved(self.index)
        } else {
            if let Some(on_complete) = self.on_complete.as_mut() {
                on_complete();
            }
            PageTurn::Completed
        }
    }

    pub fn previous(&mut self) -> PageTurn {
        if self.index == 0 {
            return PageTurn::Stayed;
        }
        self.index -= 1;
        self.direction = Direction::Backward;
        PageTurn::Moved(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based, for "Page n of m".
    pub fn position(&self) -> usize {
        self.index + 1
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_page(&self) -> Option<&NotebookPage> {
        self.pages.get(self.index)
    }

    pub fn pages(&self) -> &[NotebookPage] {
        &self.pages
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.pages.len()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl std::fmt::Debug for NotebookPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookPager")
            .field("pages", &self.pages.len())
            .field("index", &self.index)
            .field("direction", &self.direction)
            .finish()
    }
}

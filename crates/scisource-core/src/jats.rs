//! Front-matter extraction from JATS full-text XML.
//!
//! Only the `<front>` block is read: article title, alternative title, and
//! the first listed contributor. Parsing stops at `<body>`.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::CoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContributorName {
    pub surname: String,
    pub given_names: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: String,
    pub alt_title: String,
    /// The first `<contrib>` of the article metadata, whatever it holds.
    pub first_author: Option<ContributorName>,
}

impl FrontMatter {
    /// The article title, or the alternative title when the main one is
    /// empty.
    pub fn best_title(&self) -> &str {
        if self.title.is_empty() {
            &self.alt_title
        } else {
            &self.title
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let xml = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Self::parse(&xml)
    }

    pub fn parse(xml: &str) -> Result<Self, CoreError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut front = FrontMatter::default();
        let mut author = ContributorName::default();
        let mut author_seen = false;
        let mut author_done = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.local_name().as_ref().to_vec();
                    if name == b"body" {
                        break;
                    }
                    stack.push(name);
                }
                Event::Empty(e) => {
                    if e.local_name().as_ref() == b"contrib" && in_article_meta(&stack) {
                        author_seen = true;
                        author_done = true;
                    }
                }
                Event::End(_) => {
                    if let Some(name) = stack.pop()
                        && name == b"contrib"
                        && in_article_meta(&stack)
                    {
                        author_seen = true;
                        author_done = true;
                    }
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    let target = if within(&stack, b"article-title") && in_article_meta(&stack) {
                        Some(&mut front.title)
                    } else if within(&stack, b"alt-title") && in_article_meta(&stack) {
                        Some(&mut front.alt_title)
                    } else if !author_done && within(&stack, b"contrib") && in_article_meta(&stack) {
                        if within(&stack, b"surname") {
                            Some(&mut author.surname)
                        } else if within(&stack, b"given-names") {
                            Some(&mut author.given_names)
                        } else {
                            None
                        }
                    } else {
                        None
                    };
                    if let Some(target) = target {
                        target.push_str(&text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        front.title = normalize(&front.title);
        front.alt_title = normalize(&front.alt_title);
        if author_seen {
            author.surname = normalize(&author.surname);
            author.given_names = normalize(&author.given_names);
            front.first_author = Some(author);
        }
        Ok(front)
    }
}

fn within(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.iter().any(|n| n == name)
}

fn in_article_meta(stack: &[Vec<u8>]) -> bool {
    within(stack, b"article-meta")
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

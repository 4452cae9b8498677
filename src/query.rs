/// Number of results requested per page
pub const PAGE_SIZE: u32 = 50;

const FILTERS: &str = "min_faves:1000 min_retweets:100 lang:en -filter:replies";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Latest,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Latest => "Latest",
        }
    }
}

/// A formatted search, ready to hand to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub product: Product,
    pub count: u32,
}

impl SearchQuery {
    pub fn latest(raw: &str) -> Self {
        Self {
            text: format_query(raw),
            product: Product::Latest,
            count: PAGE_SIZE,
        }
    }
}

/// Quotes every whitespace separated term, ANDs them together and appends the
/// popularity, language and reply filters.
pub fn format_query(raw: &str) -> String {
    let terms = raw
        .split_whitespace()
        .map(|term| format!("\"{term}\""))
        .collect::<Vec<_>>()
        .join(" and ");
    format!("{terms} {FILTERS}")
}

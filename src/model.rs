use serde::Serialize;

/// A post as delivered by a client adapter, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct PageItem {
    pub id: String,
    pub author_name: String,
    pub author_handle: String,
    pub text: String,
    /// Long-form body, when the platform returned one
    pub full_text: Option<String>,
    pub created_at: String,
    pub retweet_count: u64,
    pub favorite_count: u64,
    pub media: Vec<Media>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Media {
    pub url: String,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Tweet,
}

/// One normalized post, as returned by `/get_tweets`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Record {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Tweet")]
    pub text: String,
    #[serde(rename = "Created_At")]
    pub created_at: String,
    #[serde(rename = "Retweets")]
    pub retweets: u64,
    #[serde(rename = "Favorites")]
    pub favorites: u64,
    #[serde(rename = "Tweet_Link")]
    pub link: String,
    #[serde(rename = "Media_URL")]
    pub media_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: RecordKind,
}

impl From<PageItem> for Record {
    fn from(item: PageItem) -> Self {
        let body = item.full_text.unwrap_or(item.text);
        Record {
            link: format!(
                "https://twitter.com/{}/status/{}",
                item.author_handle, item.id
            ),
            username: item.author_name,
            text: body.replace('\n', " "),
            created_at: item.created_at,
            retweets: item.retweet_count,
            favorites: item.favorite_count,
            media_url: item.media.into_iter().next().map(|m| m.url),
            kind: RecordKind::Tweet,
        }
    }
}

//! Client for the platform's web API: the same login flow and GraphQL search
//! the website itself uses, authenticated with account credentials rather
//! than a developer token.

use crate::model::{Media, PageItem};
use crate::query::SearchQuery;
use crate::twitter::{
    Authentication, ClientFactory, FetchError, Page, PageCursor, TwitterClient,
};
use anyhow::{bail, Context};
use async_trait::async_trait;
use maplit::hashmap;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

const TIMEOUT_SEC: u64 = 10;

// Public token shipped with the web client
const BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

const SEARCH_TIMELINE: &str = "flaR-PUMshxFWZWPNpq4zA/SearchTimeline";

const MAX_LOGIN_STEPS: usize = 16;

/// API error code reported in the body when the account is rate limited
const RATE_LIMIT_CODE: i64 = 88;

/// Base URLs, each ending in `/`
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api: Url,
    pub graphql: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api: Url::from_str("https://api.x.com/").expect("static API url"),
            graphql: Url::from_str("https://x.com/i/api/graphql/")
                .expect("static GraphQL url"),
        }
    }
}

impl Endpoints {
    fn api(&self, path: &str) -> anyhow::Result<Url> {
        self.api.join(path).context("Invalid API url")
    }

    fn search(&self) -> Result<Url, FetchError> {
        self.graphql
            .join(SEARCH_TIMELINE)
            .map_err(|e| FetchError::Other(format!("Invalid search url: {e}")))
    }
}

#[derive(Clone)]
pub struct WebClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    cookies: Arc<Jar>,
    endpoints: Endpoints,
    guest_token: Mutex<Option<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TwitterResponse<T> {
    Ok(T),
    // Detect the case where the API returns 200, but contains errors
    Error { errors: Vec<ApiError> },
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct GuestTokenResponse {
    guest_token: String,
}

#[derive(Deserialize)]
struct FlowResponse {
    flow_token: String,
    #[serde(default)]
    subtasks: Vec<Subtask>,
}

#[derive(Deserialize)]
struct Subtask {
    subtask_id: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Deserialize)]
struct SearchData {
    search_by_raw_query: SearchByRawQuery,
}

#[derive(Deserialize)]
struct SearchByRawQuery {
    search_timeline: SearchTimeline,
}

#[derive(Deserialize)]
struct SearchTimeline {
    timeline: Timeline,
}

#[derive(Deserialize)]
struct Timeline {
    #[serde(default)]
    instructions: Vec<Instruction>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Instruction {
    TimelineAddEntries {
        #[serde(default)]
        entries: Vec<Entry>,
    },
    TimelineReplaceEntry {
        entry: Entry,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Entry {
    #[serde(rename = "entryId")]
    entry_id: String,
    content: EntryContent,
}

#[derive(Deserialize)]
struct EntryContent {
    #[serde(rename = "itemContent")]
    item_content: Option<ItemContent>,
    value: Option<String>,
}

#[derive(Deserialize)]
struct ItemContent {
    tweet_results: Option<TweetResults>,
}

#[derive(Deserialize)]
struct TweetResults {
    result: Option<TweetResult>,
}

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum TweetResult {
    Tweet(RawTweet),
    TweetWithVisibilityResults {
        tweet: RawTweet,
    },
    #[serde(other)]
    Unavailable,
}

#[derive(Deserialize)]
struct RawTweet {
    rest_id: String,
    core: RawCore,
    legacy: RawLegacy,
    note_tweet: Option<NoteTweet>,
}

#[derive(Deserialize)]
struct RawCore {
    user_results: UserResults,
}

#[derive(Deserialize)]
struct UserResults {
    result: RawUser,
}

#[derive(Deserialize)]
struct RawUser {
    legacy: RawUserLegacy,
}

#[derive(Deserialize)]
struct RawUserLegacy {
    name: String,
    screen_name: String,
}

#[derive(Deserialize)]
struct RawLegacy {
    full_text: String,
    created_at: String,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    favorite_count: u64,
    #[serde(default)]
    entities: RawEntities,
}

#[derive(Deserialize, Default)]
struct RawEntities {
    #[serde(default)]
    media: Vec<RawMedia>,
}

#[derive(Deserialize)]
struct RawMedia {
    media_url_https: String,
}

#[derive(Deserialize)]
struct NoteTweet {
    note_tweet_results: NoteTweetResults,
}

#[derive(Deserialize)]
struct NoteTweetResults {
    result: NoteTweetResult,
}

#[derive(Deserialize)]
struct NoteTweetResult {
    text: String,
}

async fn deserialize_response<T: DeserializeOwned>(response: Response) -> anyhow::Result<T> {
    let status = response.status();
    let text = response.text().await.context("Bad response text")?;
    if !status.is_success() {
        let code = status.as_u16();
        bail!(format!("Response was not successful: {code}\n{text}"))
    }
    let twitter = match serde_json::from_str::<TwitterResponse<T>>(&text) {
        Ok(ok) => ok,
        Err(e) => bail!(format!("Unable to deserialize due to: {e}\nContents:\n{text}")),
    };
    Ok(match twitter {
        TwitterResponse::Ok(ok) => ok,
        TwitterResponse::Error { .. } => bail!(text),
    })
}

/// Like `deserialize_response`, but sorts failures into rate limits and
/// everything else
async fn classify_response<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited);
    }
    let text = response
        .text()
        .await
        .map_err(|e| FetchError::Other(format!("Bad response text: {e}")))?;
    if !status.is_success() {
        let code = status.as_u16();
        return Err(FetchError::Other(format!(
            "Response was not successful: {code}\n{text}"
        )));
    }
    match serde_json::from_str::<TwitterResponse<T>>(&text) {
        Ok(TwitterResponse::Ok(ok)) => Ok(ok),
        Ok(TwitterResponse::Error { errors }) => {
            if errors.iter().any(|e| e.code == RATE_LIMIT_CODE) {
                Err(FetchError::RateLimited)
            } else {
                let messages = errors
                    .iter()
                    .map(|e| format!("{} ({})", e.message, e.code))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(FetchError::Other(messages))
            }
        }
        Err(e) => Err(FetchError::Other(format!(
            "Unable to deserialize due to: {e}"
        ))),
    }
}

impl WebClient {
    pub fn new(endpoints: Endpoints) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", BEARER_TOKEN);
        let value = HeaderValue::from_str(&value)?;
        headers.insert(AUTHORIZATION, value);
        headers.insert("x-twitter-active-user", HeaderValue::from_static("yes"));
        headers.insert("x-twitter-client-language", HeaderValue::from_static("en"));
        let cookies = Arc::new(Jar::default());
        Ok(Self {
            inner: Arc::new(Inner {
                client: Client::builder()
                    .default_headers(headers)
                    .cookie_provider(cookies.clone())
                    .timeout(Duration::from_secs(TIMEOUT_SEC))
                    .build()?,
                cookies,
                endpoints,
                guest_token: Mutex::new(None),
            }),
        })
    }

    async fn activate_guest(&self) -> anyhow::Result<()> {
        let url = self.inner.endpoints.api("1.1/guest/activate.json")?;
        let response = self.inner.client.post(url).send().await?;
        let response = deserialize_response::<GuestTokenResponse>(response)
            .await
            .context("Unable to activate guest token")?;
        if let Ok(mut token) = self.inner.guest_token.lock() {
            *token = Some(response.guest_token);
        }
        Ok(())
    }

    async fn flow_step(&self, start: bool, body: Value) -> anyhow::Result<FlowResponse> {
        let mut url = self.inner.endpoints.api("1.1/onboarding/task.json")?;
        if start {
            url.query_pairs_mut().append_pair("flow_name", "login");
        }
        let request = self
            .inner
            .with_session(self.inner.client.post(url), &self.inner.endpoints.api);
        let response = request.json(&body).send().await?;
        deserialize_response(response).await
    }
}

impl Inner {
    fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.cookies.cookies(url)?;
        let header = header.to_str().ok()?;
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    /// Adds the guest token and, once logged in, the CSRF token taken from
    /// the session cookies
    fn with_session(&self, mut request: RequestBuilder, url: &Url) -> RequestBuilder {
        if let Some(token) = self.guest_token.lock().ok().and_then(|t| t.as_ref().cloned()) {
            request = request.header("x-guest-token", token);
        }
        if let Some(csrf) = self.cookie(url, "ct0") {
            request = request.header("x-csrf-token", csrf);
        }
        if self.cookie(url, "auth_token").is_some() {
            request = request.header("x-twitter-auth-type", "OAuth2Session");
        }
        request.header(CONTENT_TYPE, "application/json")
    }

    async fn search_page(
        &self,
        query: &SearchQuery,
        cursor: Option<&str>,
    ) -> Result<(Vec<PageItem>, Option<String>), FetchError> {
        let url = self.endpoints.search()?;
        let mut variables = json!({
            "rawQuery": query.text,
            "count": query.count,
            "querySource": "typed_query",
            "product": query.product.as_str(),
        });
        if let Some(cursor) = cursor {
            variables["cursor"] = json!(cursor);
        }
        let params = hashmap! {
            "variables" => variables.to_string(),
            "features" => search_features().to_string(),
        };
        let request = self.with_session(self.client.get(url.clone()), &url);
        let response = request
            .query(&params)
            .send()
            .await
            .map_err(|e| FetchError::Other(format!("Error performing HTTP request: {e}")))?;
        let response = classify_response::<SearchResponse>(response).await?;
        Ok(convert_timeline(
            response.data.search_by_raw_query.search_timeline.timeline,
        ))
    }
}

fn search_features() -> Value {
    json!({
        "rweb_tipjar_consumption_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "communities_web_enable_tweet_community_results_fetch": true,
        "c9s_tweet_anatomy_moderator_badge_enabled": true,
        "articles_preview_enabled": true,
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "responsive_web_twitter_article_tweet_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "creator_subscriptions_quote_tweet_preview_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "rweb_video_timestamps_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "responsive_web_enhance_cards_enabled": false,
    })
}

fn convert_timeline(timeline: Timeline) -> (Vec<PageItem>, Option<String>) {
    let mut items: Vec<PageItem> = Vec::new();
    let mut bottom: Option<String> = None;
    let mut visit = |entry: Entry| {
        if entry.entry_id.starts_with("cursor-bottom") {
            bottom = entry.content.value;
        } else if entry.entry_id.starts_with("tweet-") {
            let tweet = entry
                .content
                .item_content
                .and_then(|c| c.tweet_results)
                .and_then(|r| r.result);
            match tweet {
                Some(TweetResult::Tweet(tweet))
                | Some(TweetResult::TweetWithVisibilityResults { tweet }) => {
                    items.push(tweet.into())
                }
                Some(TweetResult::Unavailable) | None => {
                    log::debug!("Skipping unavailable entry {}", entry.entry_id)
                }
            }
        }
    };
    for instruction in timeline.instructions {
        match instruction {
            Instruction::TimelineAddEntries { entries } => {
                entries.into_iter().for_each(&mut visit)
            }
            Instruction::TimelineReplaceEntry { entry } => visit(entry),
            Instruction::Other => {}
        }
    }
    (items, bottom)
}

impl From<RawTweet> for PageItem {
    fn from(tweet: RawTweet) -> Self {
        let user = tweet.core.user_results.result.legacy;
        PageItem {
            id: tweet.rest_id,
            author_name: user.name,
            author_handle: user.screen_name,
            text: tweet.legacy.full_text,
            full_text: tweet.note_tweet.map(|n| n.note_tweet_results.result.text),
            created_at: tweet.legacy.created_at,
            retweet_count: tweet.legacy.retweet_count,
            favorite_count: tweet.legacy.favorite_count,
            media: tweet
                .legacy
                .entities
                .media
                .into_iter()
                .map(|m| Media {
                    url: m.media_url_https,
                })
                .collect(),
        }
    }
}

fn subtask_input(subtask: &str, auth: &Authentication) -> Option<Value> {
    Some(match subtask {
        "LoginJsInstrumentationSubtask" => json!({
            "subtask_id": subtask,
            "js_instrumentation": { "response": "{}", "link": "next_link" },
        }),
        "LoginEnterUserIdentifierSSO" => json!({
            "subtask_id": subtask,
            "settings_list": {
                "setting_responses": [{
                    "key": "user_identifier",
                    "response_data": { "text_data": { "result": auth.username } },
                }],
                "link": "next_link",
            },
        }),
        "LoginEnterAlternateIdentifierSubtask" => json!({
            "subtask_id": subtask,
            "enter_text": { "text": auth.email, "link": "next_link" },
        }),
        "LoginEnterPassword" => json!({
            "subtask_id": subtask,
            "enter_password": { "password": auth.password, "link": "next_link" },
        }),
        "AccountDuplicationCheck" => json!({
            "subtask_id": subtask,
            "check_logged_in_account": { "link": "AccountDuplicationCheck_false" },
        }),
        _ => return None,
    })
}

#[async_trait]
impl TwitterClient for WebClient {
    async fn login(&self, auth: &Authentication) -> anyhow::Result<()> {
        self.activate_guest().await?;
        let mut flow = self
            .flow_step(
                true,
                json!({
                    "input_flow_data": {
                        "flow_context": {
                            "debug_overrides": {},
                            "start_location": { "location": "splash_screen" },
                        },
                    },
                    "subtask_versions": {},
                }),
            )
            .await
            .context("Unable to start login flow")?;
        for _ in 0..MAX_LOGIN_STEPS {
            let subtask = match flow.subtasks.first() {
                Some(subtask) => subtask.subtask_id.as_str(),
                None => return Ok(()),
            };
            if subtask == "LoginSuccessSubtask" {
                log::info!("Logged in as {}", auth.username);
                return Ok(());
            }
            log::debug!("Answering login step {}", subtask);
            let input = match subtask_input(subtask, auth) {
                Some(input) => input,
                None => bail!("Unsupported login step: {subtask}"),
            };
            flow = self
                .flow_step(
                    false,
                    json!({ "flow_token": flow.flow_token, "subtask_inputs": [input] }),
                )
                .await
                .with_context(|| format!("Login step {subtask} failed"))?;
        }
        bail!("Login did not complete after {MAX_LOGIN_STEPS} steps")
    }

    fn search(&self, query: SearchQuery) -> Box<dyn PageCursor> {
        Box::new(SearchCursor {
            inner: self.inner.clone(),
            query,
            next: None,
            exhausted: false,
        })
    }
}

struct SearchCursor {
    inner: Arc<Inner>,
    query: SearchQuery,
    next: Option<String>,
    exhausted: bool,
}

impl SearchCursor {
    async fn fetch(&mut self, cursor: Option<String>) -> Result<Page, FetchError> {
        let (items, next) = self.inner.search_page(&self.query, cursor.as_deref()).await?;
        self.exhausted = next.is_none();
        self.next = next;
        Ok(Page { items })
    }
}

#[async_trait]
impl PageCursor for SearchCursor {
    async fn fetch_first(&mut self) -> Result<Page, FetchError> {
        self.fetch(None).await
    }

    async fn fetch_next(&mut self) -> Result<Page, FetchError> {
        match self.next.clone() {
            Some(cursor) => self.fetch(Some(cursor)).await,
            None => Ok(Page::default()),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[derive(Default)]
pub struct WebClientFactory {
    pub endpoints: Endpoints,
}

impl ClientFactory for WebClientFactory {
    fn create(&self) -> anyhow::Result<Box<dyn TwitterClient>> {
        Ok(Box::new(WebClient::new(self.endpoints.clone())?))
    }
}

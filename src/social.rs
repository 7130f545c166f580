// ===============================
// src/social.rs
// ===============================
//
// Social stream adapters:
// - run_mock : replay post terjadwal (default: satu post dari signal source
//              2s setelah start, lalu lagi setelah 2 menit)
// - run_ws   : WebSocket JSON, payload berbentuk tweet (user.id, text,
//              extended_tweet.full_text, entities.media[])
//
// Adapter tidak memfilter author; identitas author diteruskan apa adanya dan
// engine yang memutuskan.
//
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::{sync::mpsc, time::sleep};
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};
use url::Url;

use crate::domain::SocialEvent;
use crate::feed::backoff_delay;

// ---- Wire model (tweet-shaped) ----
#[derive(Debug, Deserialize)]
pub struct TweetPayload {
    pub user: TweetUser,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub extended_tweet: Option<ExtendedTweet>,
    #[serde(default)]
    pub entities: Option<Entities>,
}

#[derive(Debug, Deserialize)]
pub struct TweetUser {
    pub id: u64,
    #[serde(default)]
    pub screen_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtendedTweet {
    pub full_text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub media: Vec<MediaEntity>,
}

#[derive(Debug, Deserialize)]
pub struct MediaEntity {
    #[serde(default)]
    pub media_url_https: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
}

impl From<TweetPayload> for SocialEvent {
    fn from(t: TweetPayload) -> Self {
        let media_urls = t
            .entities
            .unwrap_or_default()
            .media
            .into_iter()
            .filter_map(|m| m.media_url_https.or(m.media_url))
            .collect();
        SocialEvent {
            author_id: t.user.id,
            screen_name: t.user.screen_name,
            text: t.text,
            extended_text: t.extended_tweet.map(|e| e.full_text),
            media_urls,
        }
    }
}

pub fn parse_post(txt: &str) -> Result<SocialEvent, serde_json::Error> {
    serde_json::from_str::<TweetPayload>(txt).map(SocialEvent::from)
}

/// Canned signal-source post, delivered twice (after 2s and after 2 more minutes).
pub fn default_script(signal_author: u64, first: Duration, repeat: Duration) -> Vec<(Duration, SocialEvent)> {
    let post = SocialEvent {
        author_id: signal_author,
        screen_name: "signal_source".to_string(),
        text: "blah blah blah blah.... Doge".to_string(),
        extended_text: Some("blah blah Dogecoin to the moon!!! blah blah".to_string()),
        media_urls: vec![],
    };
    vec![(first, post.clone()), (repeat, post)]
}

/// Replay `(delay, post)` pairs; each delay counts from the previous post.
pub async fn run_mock(tx: mpsc::Sender<SocialEvent>, script: Vec<(Duration, SocialEvent)>) {
    for (delay, post) in script {
        sleep(delay).await;
        info!(author = post.author_id, "mock social: injecting post");
        if tx.send(post).await.is_err() {
            return;
        }
    }
    info!("mock social: script finished");
}

pub async fn run_ws(tx: mpsc::Sender<SocialEvent>, ws_url: String) {
    let url = match Url::parse(&ws_url) {
        Ok(u) => u,
        Err(e) => {
            error!(?e, %ws_url, "bad social ws url");
            return;
        }
    };

    let mut attempt: u32 = 0;
    loop {
        info!(%ws_url, "connecting social stream");
        match connect_async(url.clone()).await {
            Ok((mut ws, _)) => {
                info!("connected to social stream");
                attempt = 0;
                while let Some(frame) = ws.next().await {
                    match frame {
                        Ok(m) if m.is_text() => {
                            let txt = match m.into_text() {
                                Ok(t) => t,
                                Err(e) => {
                                    warn!(?e, "failed to read text frame");
                                    continue;
                                }
                            };
                            match parse_post(&txt) {
                                Ok(post) => {
                                    if tx.send(post).await.is_err() {
                                        info!("social feed: engine gone, stopping");
                                        return;
                                    }
                                }
                                // keep-alive / delete notice / stall warning dll
                                Err(e) => warn!(?e, "skipping non-post social frame"),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(?e, "social ws read error");
                            break;
                        }
                    }
                }
                warn!("social stream disconnected, will reconnect…");
            }
            Err(e) => error!(?e, "social connect failed"),
        }

        attempt = attempt.saturating_add(1);
        sleep(backoff_delay(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tweet_payload_maps_to_social_event() {
        let txt = r#"{
            "text":"blah blah... Doge",
            "truncated":true,
            "user":{"id":44196397,"screen_name":"elonmusk","name":"E"},
            "extended_tweet":{"full_text":"blah blah Dogecoin to the moon!!!"},
            "entities":{"media":[{"media_url_https":"https://pbs.example/1.jpg"}]}
        }"#;
        let ev = parse_post(txt).unwrap();
        assert_eq!(ev.author_id, 44196397);
        assert_eq!(ev.screen_name, "elonmusk");
        assert_eq!(ev.full_text(), "blah blah Dogecoin to the moon!!!");
        assert!(ev.has_media());
        assert_eq!(ev.media_urls, vec!["https://pbs.example/1.jpg".to_string()]);
    }

    #[test]
    fn short_tweet_without_entities() {
        let ev = parse_post(r#"{"text":"hi","user":{"id":5}}"#).unwrap();
        assert_eq!(ev.extended_text, None);
        assert!(!ev.has_media());
        assert_eq!(ev.full_text(), "hi");
    }

    #[test]
    fn frame_without_user_is_not_a_post() {
        assert!(parse_post(r#"{"limit":{"track":3}}"#).is_err());
    }

    #[tokio::test]
    async fn mock_replays_script_in_order() {
        let script = default_script(7, Duration::from_millis(1), Duration::from_millis(1));
        let (tx, mut rx) = mpsc::channel(4);
        run_mock(tx, script).await;
        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert_eq!(a.author_id, 7);
        assert_eq!(a, b);
        assert!(rx.recv().await.is_none());
    }
}

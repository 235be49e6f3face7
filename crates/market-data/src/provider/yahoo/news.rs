use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use tracing::debug;
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::NewsArticle;
use crate::provider::{http, NewsSource};
use crate::registry::{BackoffPolicy, RateLimiter};

use super::models::YahooSearchResponse;
use super::{API_NAME, BASE_URL, USER_AGENT};

/// Yahoo Finance news via the search endpoint.
pub struct YahooNewsSource {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    backoff: BackoffPolicy,
    max_items: usize,
}

impl YahooNewsSource {
    pub fn new(
        limiter: Arc<RateLimiter>,
        backoff: BackoffPolicy,
        max_items: usize,
    ) -> Result<Self, MarketDataError> {
        Ok(Self {
            client: http::client(USER_AGENT)?,
            limiter,
            backoff,
            max_items,
        })
    }

    async fn request_news(&self, symbol: &str) -> Result<YahooSearchResponse, MarketDataError> {
        let url = format!(
            "{}/v1/finance/search?q={}&quotesCount=0&newsCount={}",
            BASE_URL,
            encode(symbol),
            self.max_items
        );
        http::get_json(self.client.get(&url), API_NAME, symbol).await
    }
}

#[async_trait]
impl NewsSource for YahooNewsSource {
    fn id(&self) -> &'static str {
        "YAHOO_NEWS"
    }

    async fn fetch_news(&self, symbol: &str) -> Result<Vec<NewsArticle>, MarketDataError> {
        let response = self
            .limiter
            .with_backoff(API_NAME, &self.backoff, || self.request_news(symbol))
            .await?;
        let articles = parse_news(response, self.max_items);
        debug!("YAHOO_NEWS: {} articles for {}", articles.len(), symbol);
        Ok(articles)
    }
}

/// Keep items that have both a link and a title.
fn parse_news(response: YahooSearchResponse, max_items: usize) -> Vec<NewsArticle> {
    response
        .news
        .into_iter()
        .filter_map(|item| {
            let link = item.link.filter(|l| !l.trim().is_empty())?;
            let title = item.title.filter(|t| !t.trim().is_empty())?;
            Some(NewsArticle {
                link,
                title,
                publisher: item.publisher,
                published_at: item
                    .provider_publish_time
                    .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                summary: item.summary,
            })
        })
        .take(max_items)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_news_drops_items_without_link() {
        let response: YahooSearchResponse = serde_json::from_str(
            r#"{"news":[
                {"title":"Acme beats estimates","publisher":"Reuters",
                 "link":"https://example.com/a1","providerPublishTime":1717000000},
                {"title":"No link"},
                {"link":"https://example.com/untitled"},
                {"title":"Acme guidance raised","link":"https://example.com/a2"}
            ]}"#,
        )
        .unwrap();

        let articles = parse_news(response, 10);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].publisher.as_deref(), Some("Reuters"));
        assert_eq!(
            articles[0].published_at.map(|d| d.timestamp()),
            Some(1717000000)
        );
        assert!(articles[1].published_at.is_none());
    }

    #[test]
    fn test_parse_news_respects_limit() {
        let response: YahooSearchResponse = serde_json::from_str(
            r#"{"news":[
                {"title":"a","link":"https://example.com/1"},
                {"title":"b","link":"https://example.com/2"},
                {"title":"c","link":"https://example.com/3"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(parse_news(response, 2).len(), 2);
    }
}

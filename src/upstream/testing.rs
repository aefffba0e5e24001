//! Scripted upstream for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};

use crate::error::Result;

use super::transport::{ApodQuery, ApodTransport, RawResponse};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("test date")
}

pub fn payload_json(date: NaiveDate, media_type: &str) -> Value {
    json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "title": format!("Picture for {}", date),
        "explanation": format!("What happened on {}", date),
        "url": format!("https://apod.example/{}.jpg", date),
        "hdurl": format!("https://apod.example/{}-hd.jpg", date),
        "media_type": media_type,
        "copyright": " Someone ",
        "service_version": "v1"
    })
}

pub fn ok_response(body: Value) -> RawResponse {
    RawResponse {
        status: 200,
        retry_after: None,
        body: body.to_string().into_bytes(),
    }
}

pub fn status_response(status: u16) -> RawResponse {
    RawResponse {
        status,
        retry_after: Some("0".to_string()),
        body: Vec::new(),
    }
}

/// Serves a picture for any date unless the script says otherwise.
pub fn default_response(query: ApodQuery) -> RawResponse {
    match query {
        ApodQuery::Date(d) => ok_response(payload_json(d, "image")),
        ApodQuery::Random(count) => {
            let start = date("2001-01-01");
            let items: Vec<Value> = (0..i64::from(count))
                .map(|i| payload_json(start + Duration::days(i), "image"))
                .collect();
            ok_response(Value::Array(items))
        }
    }
}

type Script = dyn Fn(ApodQuery) -> RawResponse + Send + Sync;

pub struct FakeTransport {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(ApodQuery) -> RawResponse + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn serving_all_dates() -> Self {
        Self::new(default_response)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApodTransport for FakeTransport {
    async fn get(&self, query: ApodQuery) -> Result<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.script)(query))
    }
}

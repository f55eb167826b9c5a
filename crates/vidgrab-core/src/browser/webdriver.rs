//! W3C WebDriver client over curl.

use serde_json::{json, Value};
use std::time::Duration;

use super::{Browser, BrowserError, BrowserResult};

/// Talks to an already running WebDriver server (geckodriver, chromedriver).
/// A session is opened on first use and deleted on drop.
pub struct WebDriverBrowser {
    endpoint: String,
    timeout: Duration,
    session_id: Option<String>,
}

impl WebDriverBrowser {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout,
            session_id: None,
        }
    }

    fn request(&self, method: &str, path: &str, body: Option<&Value>) -> BrowserResult<Value> {
        let url = format!("{}{}", self.endpoint, path);
        let mut easy = curl::easy::Easy::new();
        easy.url(&url)?;
        easy.connect_timeout(self.timeout)?;
        // Page loads and script execution can legitimately take a while.
        easy.timeout(self.timeout * 4)?;
        let mut headers = curl::easy::List::new();
        headers.append("Content-Type: application/json; charset=utf-8")?;
        easy.http_headers(headers)?;

        let payload = match body {
            Some(v) => serde_json::to_vec(v)?,
            None => Vec::new(),
        };
        match method {
            "POST" => {
                easy.post(true)?;
                easy.post_fields_copy(&payload)?;
            }
            "GET" => easy.get(true)?,
            other => easy.custom_request(other)?,
        }

        let mut response = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                response.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }
        let status = easy.response_code()?;
        let parsed: Value = if response.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&response)?
        };
        let value = parsed.get("value").cloned().unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| value.get("error").and_then(Value::as_str))
                .unwrap_or("unknown error")
                .to_string();
            return Err(BrowserError::Protocol { status, message });
        }
        Ok(value)
    }

    fn session(&mut self) -> BrowserResult<String> {
        if let Some(id) = &self.session_id {
            return Ok(id.clone());
        }
        let value = self.request(
            "POST",
            "/session",
            Some(&json!({ "capabilities": { "alwaysMatch": {} } })),
        )?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                status: 200,
                message: "new session response has no sessionId".to_string(),
            })?
            .to_string();
        tracing::debug!(session = %id, "webdriver session opened");
        self.session_id = Some(id.clone());
        Ok(id)
    }

    fn session_call(&mut self, method: &str, suffix: &str, body: Option<&Value>) -> BrowserResult<Value> {
        let id = self.session()?;
        let result = self.request(method, &format!("/session/{}{}", id, suffix), body);
        if let Err(BrowserError::Protocol { status: 404, .. }) = &result {
            // Session died (driver restarted); open a fresh one next time.
            self.session_id = None;
        }
        result
    }
}

impl Browser for WebDriverBrowser {
    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.session_call("POST", "/url", Some(&json!({ "url": url })))?;
        Ok(())
    }

    fn execute_script(&mut self, script: &str) -> BrowserResult<Value> {
        self.session_call(
            "POST",
            "/execute/sync",
            Some(&json!({ "script": script, "args": [] })),
        )
    }

    fn rendered_source(&mut self) -> BrowserResult<String> {
        let v = self.session_call("GET", "/source", None)?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    fn current_url(&mut self) -> BrowserResult<String> {
        let v = self.session_call("GET", "/url", None)?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        if let Some(id) = self.session_id.take() {
            if let Err(e) = self.request("DELETE", &format!("/session/{}", id), None) {
                tracing::debug!("failed to close webdriver session {}: {}", id, e);
            }
        }
    }
}

//! GET a page, frame or manifest into memory.

use super::Transport;
use crate::retry::TransferError;

/// Body of a fetched page. Non-2xx responses are returned too, since block
/// pages often arrive with status 200 and real errors need body inspection.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u32,
    pub body: Vec<u8>,
    pub effective_url: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Transport {
    /// Fetch `url` with gzip negotiation and a spoofed referer.
    pub fn fetch(&self, url: &str) -> Result<FetchedPage, TransferError> {
        let mut body = Vec::new();
        let mut easy = self.build_request(url, &self.options().user_agent, true, true)?;
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }
        let status = easy.response_code()?;
        let effective_url = easy
            .effective_url()?
            .map(str::to_string)
            .unwrap_or_else(|| url.to_string());
        Ok(FetchedPage {
            status,
            body,
            effective_url,
        })
    }

    /// Like [`Transport::fetch`] but non-2xx statuses become errors.
    pub fn fetch_ok(&self, url: &str) -> Result<FetchedPage, TransferError> {
        let page = self.fetch(url)?;
        if !page.is_success() {
            return Err(TransferError::Http(page.status));
        }
        Ok(page)
    }
}

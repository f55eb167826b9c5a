//! Remote size probing with HEAD or a body-less GET.

use super::headers::ResponseHead;
use super::Transport;
use crate::retry::TransferError;
use std::cell::RefCell;

impl Transport {
    /// Declared content length of `url`, or 0 when unknown.
    ///
    /// Never fails: any transport error is logged and reported as 0 so the
    /// caller can treat "at or below the plausible minimum" uniformly as
    /// "size unknown, retry". With `use_head == false` a cache-disabled GET is
    /// issued and aborted as soon as the headers are in.
    pub fn probe_size(&self, url: &str, use_head: bool) -> u64 {
        match self.try_probe(url, use_head) {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(url, use_head, "size probe failed: {}", e);
                0
            }
        }
    }

    fn try_probe(&self, url: &str, use_head: bool) -> Result<u64, TransferError> {
        let extra: &[&str] = if use_head {
            &[]
        } else {
            &["Cache-Control: no-cache", "Pragma: no-cache"]
        };
        let mut easy =
            self.build_request_with(url, &self.options().user_agent, false, true, extra)?;
        if use_head {
            easy.nobody(true)?;
        }

        let head = RefCell::new(ResponseHead::default());
        let perform_result = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = std::str::from_utf8(data) {
                    head.borrow_mut().push_line(s);
                }
                true
            })?;
            // Headers are all we need; refuse the body.
            transfer.write_function(|_| Ok(0))?;
            transfer.perform()
        };
        if let Err(e) = perform_result {
            if !e.is_write_error() {
                return Err(TransferError::Curl(e));
            }
        }

        let head = head.into_inner();
        let code = match head.status {
            Some(code) => code,
            None => easy.response_code()?,
        };
        if !(200..300).contains(&code) {
            return Err(TransferError::Http(code));
        }
        Ok(head.content_length.unwrap_or(0))
    }
}

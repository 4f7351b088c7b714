//! Filter Stage
//!
//! Requests are checked against the method whitelist and their verdict is
//! remembered under the correlation key. Responses and replay reports take
//! the verdict of their request; with no verdict on record they are allowed,
//! so a late or orphaned response is never silently lost.

use relay_common::{RecordKind, RelayError, RelayResult};

use crate::config::{EmitterConfig, ModifierConfig};
use crate::envelope::Envelope;
use crate::verdict::{Verdict, VerdictCache};

/// HTTP method whitelist
#[derive(Debug, Clone, Default)]
pub struct MethodWhitelist {
    methods: Vec<Vec<u8>>,
}

impl MethodWhitelist {
    /// Build from modifier config
    pub fn from_config(config: &ModifierConfig) -> Self {
        Self {
            methods: config.methods.iter().map(|m| m.as_bytes().to_vec()).collect(),
        }
    }

    /// Empty whitelist allows everything
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Check a request body. Bodies without a parsable request line never
    /// match a non-empty whitelist.
    pub fn check(&self, body: &[u8]) -> Verdict {
        if self.is_empty() {
            return Verdict::Allow;
        }
        match request_method(body) {
            Ok(method) => Verdict::from_allowed(self.methods.iter().any(|m| m == method)),
            Err(_) => {
                tracing::debug!("request line unparsable, dropping");
                Verdict::Drop
            }
        }
    }
}

/// Method token of an HTTP request line
pub fn request_method(body: &[u8]) -> RelayResult<&[u8]> {
    let line_end = body.iter().position(|&b| b == b'\n').unwrap_or(body.len());
    let line = &body[..line_end];

    let space = line
        .iter()
        .position(|&b| b == b' ')
        .ok_or(RelayError::UnparsableMethod)?;
    let method = &line[..space];

    if method.is_empty() || !method.iter().all(|&b| is_token_byte(b)) {
        return Err(RelayError::UnparsableMethod);
    }
    Ok(method)
}

#[inline(always)]
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        )
}

/// Allow/drop decision point with request/response verdict propagation
pub struct FilterStage {
    whitelist: MethodWhitelist,
    verdicts: VerdictCache,
}

impl FilterStage {
    /// Create filter stage
    pub fn new(whitelist: MethodWhitelist, verdicts: VerdictCache) -> Self {
        Self { whitelist, verdicts }
    }

    /// Create filter stage from emitter config
    pub fn from_config(config: &EmitterConfig) -> Self {
        Self::new(
            MethodWhitelist::from_config(&config.modifier),
            VerdictCache::from_config(&config.verdict_cache),
        )
    }

    /// Decide whether a record is forwarded.
    ///
    /// Touches the verdict cache exactly once per record: one `remember` for
    /// a request, one `recall` for anything else.
    pub fn evaluate(&self, envelope: &Envelope<'_>) -> Verdict {
        let header = &envelope.header;
        let key = header.correlation_key();

        match header.kind {
            RecordKind::Request => {
                let verdict = self.whitelist.check(envelope.body());
                self.verdicts.remember(key, verdict);
                verdict
            }
            RecordKind::Response | RecordKind::ReplayReport => match self.verdicts.recall(&key) {
                Some(verdict) => verdict,
                None => {
                    tracing::debug!(key = %key, kind = ?header.kind, "no request verdict, allowing");
                    Verdict::Allow
                }
            },
        }
    }

    /// Verdict cache (for housekeeping and inspection)
    pub fn verdicts(&self) -> &VerdictCache {
        &self.verdicts
    }
}

impl Default for FilterStage {
    fn default() -> Self {
        Self::from_config(&EmitterConfig::default())
    }
}

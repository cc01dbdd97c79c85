//! The versioned canonicalization rule engine.
//!
//! Rules are applied in a fixed order, most specific first. Structured
//! projections rewrite whole well-known line shapes; the generic token
//! substitutions then mask any remaining volatile values; finally path
//! hygiene and whitespace normalization run. Every replacement token is
//! angle-bracketed and digit-free, which is what makes a second pass over
//! canonical output a no-op.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::CanonicalizeConfig;
use crate::error::CanonicalError;
use crate::whitespace::collapse_whitespace;

// ── Structured-prefix projections (v1) ──────────────────────────────────

static UFW_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[UFW BLOCK\].*?\bPROTO=(\S+)(?:.*?\bDPT=(\d+))?").unwrap()
});

static AUTH_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Accepted|Failed) (password|publickey) for (?:invalid user )?\S+ from (\S+) port \d+")
        .unwrap()
});

static SESSION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bsession (opened|closed) for user \S+").unwrap());

static UID_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\buid=\d+").unwrap());

static BATCH_PROGRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(batch|chunk|page)\s+\d+\s+of\s+\d+").unwrap());

static CRON_CMD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(\w+\) CMD ").unwrap());

static CLF_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4}\]").unwrap()
});

// ── Generic token substitutions (v1) ────────────────────────────────────

static ISO_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?\b")
        .unwrap()
});

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b")
        .unwrap()
});

static MAC_ADDR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:[0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}\b").unwrap());

// Deliberately loose; candidates are vetted in code so times like 10:11:12
// are not swallowed.
static IPV6_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[0-9a-f]{0,4}(?::[0-9a-f]{0,4}){2,7}\b").unwrap());

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b").unwrap()
});

static HEX_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{12,}\b").unwrap());

static PID_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bpid=\d+").unwrap());

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?(?:ns|us|µs|ms|s)\b").unwrap());

static LARGE_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4,}\b").unwrap());

// ── Path hygiene (v1) ───────────────────────────────────────────────────

static HOME_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"/home/[^/\s]+").unwrap());

/// Canonicalize one raw log message under the configured rule version.
///
/// Pure and deterministic: no I/O, no clock, no locale. Idempotent for any
/// registered version (`canonicalize(canonicalize(x)) == canonicalize(x)`).
pub fn canonicalize(message: &str, cfg: &CanonicalizeConfig) -> Result<String, CanonicalError> {
    if cfg.version == 0 {
        return Err(CanonicalError::InvalidConfig(
            "version must be >= 1".into(),
        ));
    }
    match cfg.version {
        1 => Ok(canonicalize_v1(message)),
        other => Err(CanonicalError::UnknownVersion(other)),
    }
}

fn canonicalize_v1(message: &str) -> String {
    // Specific projections first; a projected line skips straight to cleanup.
    if let Some(caps) = UFW_BLOCK.captures(message) {
        return cleanup(&project_ufw(&caps));
    }

    let mut text = message.to_string();

    text = AUTH_LINE
        .replace(&text, |caps: &Captures<'_>| {
            format!(
                "{} {} for <USER> from {} port <PORT>",
                &caps[1], &caps[2], &caps[3]
            )
        })
        .into_owned();
    text = SESSION_LINE
        .replace_all(&text, "session $1 for user <USER>")
        .into_owned();
    text = UID_FIELD.replace_all(&text, "uid=<N>").into_owned();
    text = BATCH_PROGRESS
        .replace_all(&text, "$1 <N> of <N>")
        .into_owned();
    text = CRON_CMD.replace(&text, "(<USER>) CMD ").into_owned();
    text = CLF_TIMESTAMP.replace_all(&text, "[<TS>]").into_owned();

    // Generic token substitutions, ordered: timestamps and UUIDs before hex
    // runs, MAC before IPv6, IPv4 before bare integers, pid and durations
    // before bare integers.
    text = ISO_TIMESTAMP.replace_all(&text, "<TS>").into_owned();
    text = UUID.replace_all(&text, "<UUID>").into_owned();
    text = MAC_ADDR.replace_all(&text, "<MAC>").into_owned();
    text = IPV6_CANDIDATE
        .replace_all(&text, |caps: &Captures<'_>| {
            let candidate = &caps[0];
            if is_ipv6_like(candidate) {
                "<IPV6>".to_string()
            } else {
                candidate.to_string()
            }
        })
        .into_owned();
    text = IPV4.replace_all(&text, "<IPV4>").into_owned();
    text = HEX_RUN.replace_all(&text, "<HEX>").into_owned();
    text = PID_FIELD.replace_all(&text, "pid=<PID>").into_owned();
    text = DURATION.replace_all(&text, "<DUR>").into_owned();
    text = LARGE_INT.replace_all(&text, "<N>").into_owned();

    // Path hygiene: collapse user home directories, keep the remainder.
    text = HOME_DIR.replace_all(&text, "/home/<USER>").into_owned();

    cleanup(&text)
}

fn project_ufw(caps: &Captures<'_>) -> String {
    match caps.get(2) {
        Some(dpt) => format!("[UFW BLOCK] proto={} dpt={}", &caps[1], dpt.as_str()),
        None => format!("[UFW BLOCK] proto={}", &caps[1]),
    }
}

/// An IPv6 candidate must look like an address, not a clock reading:
/// either it contains a zero-length group (`::`) or at least one hex letter.
fn is_ipv6_like(candidate: &str) -> bool {
    candidate.contains("::") || candidate.chars().any(|c| c.is_ascii_alphabetic())
}

fn cleanup(text: &str) -> String {
    let without_controls: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    collapse_whitespace(&without_controls)
}

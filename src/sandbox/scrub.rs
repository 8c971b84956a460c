//! Secret scrubbing for captured output and tracebacks

/// Values shorter than this are too likely to collide with ordinary text
const MIN_SECRET_LEN: usize = 8;

/// Variables whose values are paths or locale noise rather than secrets
const IGNORED_VARS: &[&str] = &[
    "PATH", "HOME", "PWD", "OLDPWD", "SHELL", "TERM", "LANG", "LANGUAGE", "USER", "LOGNAME", "SHLVL",
    "HOSTNAME", "TMPDIR", "TEMP", "TMP", "_", "RUST_LOG", "RUST_BACKTRACE", "COLORTERM", "TERM_PROGRAM",
];

const IGNORED_PREFIXES: &[&str] = &["LC_", "XDG_", "SNOWFAKERY_MCP_", "CARGO_"];

/// Replaces environment-variable values with a redaction marker.
///
/// The environment is snapshotted once; variables set later are not scrubbed.
#[derive(Debug, Clone, Default)]
pub struct SecretScrubber {
    /// (name, value), longest value first so overlapping secrets redact fully
    secrets: Vec<(String, String)>,
}

impl SecretScrubber {
    /// Snapshot the current process environment
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut secrets: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(name, value)| !is_ignored(name) && value.trim().len() >= MIN_SECRET_LEN)
            .collect();
        secrets.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
        secrets.dedup_by(|a, b| a.1 == b.1);
        Self { secrets }
    }

    /// Number of values being scrubbed
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, value) in &self.secrets {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), &format!("[REDACTED:{}]", name));
            }
        }
        out
    }
}

fn is_ignored(name: &str) -> bool {
    IGNORED_VARS.contains(&name) || IGNORED_PREFIXES.iter().any(|p| name.starts_with(p))
}

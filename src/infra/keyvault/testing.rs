//! Scripted in-memory vault for unit tests.

use anyhow::{Result, bail};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{KeyStream, KeySummary, KeyVault, spawn_key_stream};

/// What the stream producer does once the scripted items run out.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interruption {
    Error,
    Panic,
}

/// Returns a fixed list of keys. The stream waits `delays[i]` before item
/// `i` (items past the end of `delays` are not delayed) and, when
/// `fail_after` is set, is interrupted once that many items were sent.
/// The complete listing fails outright when `fail_after` is set.
pub(crate) struct ScriptedVault {
    pub keys: Vec<String>,
    pub delays: Vec<Duration>,
    pub fail_after: Option<(usize, Interruption)>,
    pub calls: AtomicUsize,
}

impl ScriptedVault {
    pub fn with_keys(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            delays: Vec::new(),
            fail_after: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Same delay before every item.
    pub fn delayed(self, delay: Duration) -> Self {
        let delays = vec![delay; self.keys.len()];
        self.with_delays(delays)
    }

    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some((n, Interruption::Error));
        self
    }

    pub fn panicking_after(mut self, n: usize) -> Self {
        self.fail_after = Some((n, Interruption::Panic));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn summary(name: &str) -> Result<KeySummary> {
        KeySummary::new(name, format!("https://test.vault.azure.net/keys/{name}"))
    }
}

fn interrupt(how: Interruption, sent: usize) -> Result<()> {
    match how {
        Interruption::Error => bail!("stream interrupted after {sent} keys"),
        Interruption::Panic => panic!("producer crashed after {sent} keys"),
    }
}

#[async_trait::async_trait]
impl KeyVault for ScriptedVault {
    async fn list_keys(&self) -> Result<Vec<KeySummary>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some() {
            bail!("vault unreachable");
        }
        self.keys.iter().map(|k| Self::summary(k)).collect()
    }

    fn list_keys_stream(&self) -> KeyStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let keys = self.keys.clone();
        let delays = self.delays.clone();
        let fail_after = self.fail_after;

        spawn_key_stream(move |tx| async move {
            for (sent, name) in keys.iter().enumerate() {
                if let Some((n, how)) = fail_after.filter(|(n, _)| *n == sent) {
                    return interrupt(how, n);
                }
                if let Some(delay) = delays.get(sent) {
                    tokio::time::sleep(*delay).await;
                }
                if tx.send(Self::summary(name)).await.is_err() {
                    return Ok(());
                }
            }
            match fail_after {
                Some((n, how)) if n >= keys.len() => interrupt(how, keys.len()),
                _ => Ok(()),
            }
        })
    }
}

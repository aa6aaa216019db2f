use crate::config::SpeakerConfig;
use crate::media::AudioLevel;
use dashmap::DashMap;
use meshcall_core::ConnectionId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Speaker {
    Local,
    Remote(ConnectionId),
}

/// Audio sources currently available for sampling, local and remote.
#[derive(Clone, Default)]
pub struct AudioSources(Arc<DashMap<Speaker, Arc<dyn AudioLevel>>>);

impl AudioSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, speaker: Speaker, level: Arc<dyn AudioLevel>) {
        self.0.insert(speaker, level);
    }

    pub fn remove(&self, speaker: &Speaker) -> bool {
        self.0.remove(speaker).is_some()
    }

    pub fn contains(&self, speaker: &Speaker) -> bool {
        self.0.contains_key(speaker)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops every remote source, keeping the local one.
    pub fn retain_local(&self) {
        self.0.retain(|speaker, _| *speaker == Speaker::Local);
    }

    pub fn clear(&self) {
        self.0.clear();
    }

    /// One energy reading per source, in speaker order.
    pub fn sample(&self) -> Vec<(Speaker, u8)> {
        let mut samples: Vec<(Speaker, u8)> = self
            .0
            .iter()
            .map(|entry| (*entry.key(), entry.value().energy()))
            .collect();
        samples.sort_by_key(|(speaker, _)| *speaker);
        samples
    }
}

/// Loudest source strictly above `threshold`. On equal energy the earlier
/// sample wins.
pub fn elect(samples: &[(Speaker, u8)], threshold: u8) -> Option<Speaker> {
    let mut best: Option<(Speaker, u8)> = None;

    for &(speaker, energy) in samples {
        if energy <= threshold {
            continue;
        }
        match best {
            Some((_, loudest)) if energy <= loudest => {}
            _ => best = Some((speaker, energy)),
        }
    }

    best.map(|(speaker, _)| speaker)
}

/// Periodically re-elects the active speaker. Each tick stands alone; there
/// is no smoothing between ticks.
pub struct ActiveSpeakerMonitor {
    sources: AudioSources,
    config: SpeakerConfig,
}

impl ActiveSpeakerMonitor {
    pub fn new(sources: AudioSources, config: SpeakerConfig) -> Self {
        Self { sources, config }
    }

    pub fn tick(&self) -> Option<Speaker> {
        let samples = self.sources.sample();
        trace!("Speaker samples: {:?}", samples);
        elect(&samples, self.config.threshold)
    }

    /// Publishes the election on `tx` until every receiver is gone.
    pub async fn run(self, tx: watch::Sender<Option<Speaker>>) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let speaker = self.tick();
            let changed = tx.send_if_modified(|current| {
                if *current == speaker {
                    false
                } else {
                    *current = speaker;
                    true
                }
            });
            if changed {
                debug!("Active speaker is now {:?}", speaker);
            }

            if tx.is_closed() {
                break;
            }
        }
    }
}

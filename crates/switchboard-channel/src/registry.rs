use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;
use switchboard_config::ChannelConfig;

use crate::{ChannelDefinition, ChannelError, ChannelId, ChannelSlot, ChannelSnapshot, ChannelStore, StoreError};

/// Arena of every configured channel, indexed by id
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    slots: Vec<Arc<ChannelSlot>>,
    index: HashMap<ChannelId, usize>,
}

impl ChannelRegistry {
    pub fn from_config(channels: &[ChannelConfig]) -> Result<Self, ChannelError> {
        let definitions = channels
            .iter()
            .map(ChannelDefinition::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_definitions(definitions)
    }

    pub fn from_definitions(definitions: Vec<ChannelDefinition>) -> Result<Self, ChannelError> {
        let mut registry = Self::default();

        for definition in definitions {
            let id = definition.id;
            if registry.index.insert(id, registry.slots.len()).is_some() {
                return Err(ChannelError::Definition(format!("duplicate channel id {id}")));
            }
            registry.slots.push(Arc::new(ChannelSlot::new(definition)));
        }

        Ok(registry)
    }

    /// Load persisted state for every channel
    ///
    /// Channels the store has never seen are written with their initial state.
    pub async fn hydrate(&self, store: &dyn ChannelStore) -> Result<(), StoreError> {
        let mut initialised = 0_usize;

        for slot in &self.slots {
            match store.load(slot.id()).await? {
                Some(state) => slot.restore(&state),
                None => {
                    store.insert(slot.id(), &slot.state()).await?;
                    initialised += 1;
                }
            }
        }

        tracing::info!(
            channels = self.slots.len(),
            initialised,
            "channel registry hydrated"
        );

        Ok(())
    }

    /// Re-read persisted state, picking up changes made by other instances
    ///
    /// A channel whose record cannot be read keeps its cached state. Each
    /// read and restore holds the slot's transition lock, so a status change
    /// made meanwhile is never overwritten with the older record.
    pub async fn refresh(&self, store: &dyn ChannelStore) -> usize {
        let mut refreshed = 0;

        for slot in &self.slots {
            let _guard = slot.lock_transition().await;

            match store.load(slot.id()).await {
                Ok(Some(state)) => {
                    slot.restore(&state);
                    refreshed += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(channel_id = %slot.id(), error = %e, "failed to refresh channel state");
                }
            }
        }

        refreshed
    }

    pub fn get(&self, id: ChannelId) -> Option<&Arc<ChannelSlot>> {
        self.index.get(&id).map(|&i| &self.slots[i])
    }

    pub fn slot(&self, id: ChannelId) -> Result<Arc<ChannelSlot>, ChannelError> {
        self.get(id).cloned().ok_or(ChannelError::NotFound(id))
    }

    pub fn snapshot(&self, id: ChannelId) -> Option<ChannelSnapshot> {
        self.get(id).map(|slot| slot.snapshot())
    }

    pub fn list(&self) -> Vec<ChannelSnapshot> {
        self.slots.iter().map(|slot| slot.snapshot()).collect()
    }

    pub fn slots(&self) -> impl Iterator<Item = &Arc<ChannelSlot>> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pick an enabled channel serving `model` for `group`
    ///
    /// Only the highest priority tier is considered. Within it the pick is
    /// weighted-random; zero-weight channels only win when nothing in the
    /// tier carries weight.
    pub fn select(&self, group: &str, model: &str, exclude: &HashSet<ChannelId>) -> Result<Arc<ChannelSlot>, ChannelError> {
        let candidates: Vec<&Arc<ChannelSlot>> = self
            .slots
            .iter()
            .filter(|slot| !exclude.contains(&slot.id()))
            .filter(|slot| slot.definition().serves(group, model))
            .filter(|slot| slot.status().is_enabled())
            .collect();

        let Some(top) = candidates.iter().map(|slot| slot.definition().priority).max() else {
            return Err(ChannelError::NoneAvailable {
                group: group.to_owned(),
                model: model.to_owned(),
            });
        };

        let tier: Vec<&Arc<ChannelSlot>> = candidates
            .into_iter()
            .filter(|slot| slot.definition().priority == top)
            .collect();

        Ok(Arc::clone(pick_weighted(&tier)))
    }
}

fn pick_weighted<'a>(tier: &[&'a Arc<ChannelSlot>]) -> &'a Arc<ChannelSlot> {
    if tier.len() == 1 {
        return tier[0];
    }

    let mut rng = rand::rng();

    let total: u64 = tier.iter().map(|slot| u64::from(slot.definition().weight)).sum();
    if total == 0 {
        return tier[rng.random_range(0..tier.len())];
    }

    let mut roll = rng.random_range(0..total);
    for slot in tier {
        let weight = u64::from(slot.definition().weight);
        if roll < weight {
            return slot;
        }
        roll -= weight;
    }

    tier[tier.len() - 1]
}

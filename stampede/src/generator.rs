use rand::distributions::Alphanumeric;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use stampede_core::{RunPlan, WriteItem, MAX_KEY_LENGTH, MAX_PAYLOAD_BYTES};
use std::collections::BTreeMap;
use thiserror::Error;
use time::OffsetDateTime;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    #[error("Generated an empty key")]
    EmptyKey,

    #[error("Key of {0} chars exceeds the {MAX_KEY_LENGTH} char limit")]
    KeyTooLong(usize),

    #[error("Payload of {0} bytes exceeds the {MAX_PAYLOAD_BYTES} byte ceiling")]
    PayloadTooLarge(usize),
}

/// Produces write items. Recycles previously issued keys at the configured rate so the store
/// rejects them as duplicates.
///
/// Owned by the orchestrator's dispatch loop; never shared between tasks.
pub(crate) struct ItemGenerator {
    rng: SmallRng,
    key_prefix: String,
    payload_bytes: usize,
    duplicate_ratio: f64,
    environment_tag: String,
    issued_keys: Vec<String>,
    sequence: u64,
    duplicates: u64,
}

impl ItemGenerator {
    pub fn new(plan: &RunPlan) -> Self {
        let config = plan.config();
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        Self {
            rng,
            key_prefix: config.key_prefix.clone(),
            payload_bytes: config.payload_bytes,
            duplicate_ratio: config.duplicate_percentage / 100.,
            environment_tag: config.environment_tag.clone(),
            issued_keys: vec![],
            sequence: 0,
            duplicates: 0,
        }
    }

    pub fn next_item(&mut self) -> Result<WriteItem, GeneratorError> {
        let recycled = !self.issued_keys.is_empty() && self.rng.gen_bool(self.duplicate_ratio);

        let key = if recycled {
            let idx = self.rng.gen_range(0..self.issued_keys.len());
            self.duplicates += 1;
            self.issued_keys[idx].clone()
        } else {
            let key = self.fresh_key();
            check_key(&key)?;
            self.issued_keys.push(key.clone());
            key
        };

        if self.payload_bytes > MAX_PAYLOAD_BYTES {
            return Err(GeneratorError::PayloadTooLarge(self.payload_bytes));
        }
        let payload: String = (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(self.payload_bytes)
            .map(char::from)
            .collect();

        let mut attributes = BTreeMap::new();
        attributes.insert("environment".to_string(), self.environment_tag.clone());
        attributes.insert("sequence".to_string(), self.sequence.to_string());
        attributes.insert("duplicate".to_string(), recycled.to_string());
        self.sequence += 1;

        trace!(key = %key, recycled, "Generated item");
        Ok(WriteItem::new(
            key,
            payload,
            OffsetDateTime::now_utc(),
            attributes,
        ))
    }

    /// Every distinct key handed out so far.
    pub fn issued_keys(&self) -> &[String] {
        &self.issued_keys
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    fn fresh_key(&mut self) -> String {
        let id = uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid();
        format!("{}{}", self.key_prefix, id.hyphenated())
    }
}

fn check_key(key: &str) -> Result<(), GeneratorError> {
    let len = key.chars().count();
    if len == 0 {
        Err(GeneratorError::EmptyKey)
    } else if len > MAX_KEY_LENGTH {
        Err(GeneratorError::KeyTooLong(len))
    } else {
        Ok(())
    }
}

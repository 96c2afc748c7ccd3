// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Idempotency key for segment additions: `<uuid>:<mutationId>:<bodyId>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{StructureError, StructureResult};

/// The uuid part is kept exactly as the caller sent it; it only has to be
/// non-empty and free of `:` and whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationKey {
    pub uuid: String,
    pub mutation_id: u64,
    pub body_id: u64,
}

impl MutationKey {
    pub fn new(uuid: &str, mutation_id: u64, body_id: u64) -> StructureResult<Self> {
        if uuid.is_empty() {
            return Err(StructureError::MalformedMutationKey(
                "mutationUuid is empty".to_string(),
            ));
        }
        if uuid.contains(':') || uuid.chars().any(char::is_whitespace) {
            return Err(StructureError::MalformedMutationKey(format!(
                "mutationUuid '{}' may not contain ':' or whitespace",
                uuid
            )));
        }
        Ok(Self {
            uuid: uuid.to_string(),
            mutation_id,
            body_id,
        })
    }
}

impl fmt::Display for MutationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.uuid, self.mutation_id, self.body_id)
    }
}

impl FromStr for MutationKey {
    type Err = StructureError;

    fn from_str(s: &str) -> StructureResult<Self> {
        let mut parts = s.split(':');
        let (Some(uuid), Some(mutation_id), Some(body_id), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(StructureError::MalformedMutationKey(s.to_string()));
        };
        let mutation_id = mutation_id
            .parse()
            .map_err(|_| StructureError::MalformedMutationKey(s.to_string()))?;
        let body_id = body_id
            .parse()
            .map_err(|_| StructureError::MalformedMutationKey(s.to_string()))?;
        Self::new(uuid, mutation_id, body_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_key_format() {
        let key = MutationKey::new("4b1d8e0f-5f5c-4a7e-9a53-1f0f3f6d2c11", 3, 42).unwrap();
        let text = key.to_string();
        assert_eq!(text, "4b1d8e0f-5f5c-4a7e-9a53-1f0f3f6d2c11:3:42");
        assert_eq!(text.parse::<MutationKey>().unwrap(), key);
    }

    #[test]
    fn test_uuid_is_kept_verbatim() {
        let simple = Uuid::new_v4().simple().to_string();
        let key = MutationKey::new(&simple, 1, 10).unwrap();
        assert_eq!(key.to_string(), format!("{}:1:10", simple));

        let short = MutationKey::new("7254f", 1, 10).unwrap();
        assert_eq!(short.to_string(), "7254f:1:10");
        assert_ne!(key, MutationKey::new(&Uuid::new_v4().to_string(), 1, 10).unwrap());
    }

    #[test]
    fn test_key_rejects_garbage() {
        assert!("a:b:c".parse::<MutationKey>().is_err());
        assert!("4b1d8e0f-5f5c-4a7e-9a53-1f0f3f6d2c11:3".parse::<MutationKey>().is_err());
        assert!("4b1d8e0f-5f5c-4a7e-9a53-1f0f3f6d2c11:3:4:5".parse::<MutationKey>().is_err());
        assert!(":3:4".parse::<MutationKey>().is_err());
        assert!(MutationKey::new("", 3, 4).is_err());
        assert!(MutationKey::new("ab cd", 3, 4).is_err());
    }
}

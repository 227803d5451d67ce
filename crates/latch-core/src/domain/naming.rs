//! Default and fallback lock names

use rand::Rng;
use uuid::Uuid;

use super::lock::{LockRepository, UserId, object_label};
use crate::error::Result;

const NAME_ATTEMPTS: usize = 32;

fn candidate(label: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("{}{}", label, suffix)
}

/// Pick a name for a lock on `kind` that `owner` does not already use.
///
/// Names look like `chest4821`. After a bounded number of collisions a
/// UUID-suffixed name is used, which cannot collide in practice.
pub async fn generate_lock_name(
    repository: &dyn LockRepository,
    owner: UserId,
    kind: &str,
) -> Result<String> {
    let label = object_label(kind);
    for _ in 0..NAME_ATTEMPTS {
        let name = candidate(label);
        if repository.is_name_unique(owner, &name).await? {
            return Ok(name);
        }
    }
    Ok(format!("{}-{}", label, Uuid::new_v4().simple()))
}

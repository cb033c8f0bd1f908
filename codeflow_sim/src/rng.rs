//! Deterministic stream provider for generation.

use codeflow_core::SeedDocument;
use codeflow_env::SimResult;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

const GOLDEN: u64 = 0x9e3779b97f4a7c15;
const MIX: u64 = 0x517cc1b727220a95;

/// Generation stage that owns a random stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Timing,
    Size,
    Split,
    Placement,
    Message,
    Review,
    Quality,
}

impl Stage {
    /// ChaCha stream id for this stage.
    fn tag(&self) -> u64 {
        match self {
            Stage::Timing => 1,
            Stage::Size => 2,
            Stage::Split => 3,
            Stage::Placement => 4,
            Stage::Message => 5,
            Stage::Review => 7,
            Stage::Quality => 8,
        }
    }
}

/// Derives every random stream of a run from one base seed.
///
/// Streams are:
/// - Deterministic: same seed document, same draws
/// - Positional: a developer's streams depend only on the base seed and the
///   developer's position, never on another developer's draws
/// - Separated: each stage reads its own ChaCha stream, so adding a draw to
///   one stage never shifts another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHierarchy {
    base_seed: u64,
}

impl SeedHierarchy {
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed }
    }

    /// Base seed = first 8 bytes (LE) of SHA-256 over the canonical document.
    pub fn from_document(seed: &SeedDocument) -> SimResult<Self> {
        let digest = Sha256::digest(seed.canonical_bytes()?);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Ok(Self::new(u64::from_le_bytes(bytes)))
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Sub-seed for the developer at `index` in the roster.
    pub fn developer_seed(&self, index: usize) -> u64 {
        self.base_seed
            .wrapping_mul(GOLDEN)
            .wrapping_add((index as u64).wrapping_mul(MIX))
    }

    /// Stream for one developer and stage.
    pub fn stream(&self, developer: usize, stage: Stage) -> ChaCha8Rng {
        self.salted_stream(developer, stage, 0)
    }

    /// Stream for one developer and stage, further keyed by `salt`.
    pub fn salted_stream(&self, developer: usize, stage: Stage, salt: u64) -> ChaCha8Rng {
        let seed = self.developer_seed(developer) ^ salt.wrapping_mul(GOLDEN).rotate_left(17);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stage.tag());
        rng
    }

    /// 40-hex-char commit hash for the `commit_index`-th commit of a developer.
    pub fn commit_hash(&self, developer: usize, commit_index: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.base_seed.to_le_bytes());
        hasher.update((developer as u64).to_le_bytes());
        hasher.update(commit_index.to_le_bytes());
        hex(&hasher.finalize()[..20])
    }
}

/// Salt derived from a commit hash, used to key per-PR streams.
pub fn salt_from_hash(hash: &str) -> u64 {
    hash.get(..16)
        .and_then(|prefix| u64::from_str_radix(prefix, 16).ok())
        .unwrap_or_else(|| {
            // FNV-1a for anything that is not a hex hash
            hash.bytes().fold(0xcbf29ce484222325, |acc, b| {
                (acc ^ u64::from(b)).wrapping_mul(0x100000001b3)
            })
        })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

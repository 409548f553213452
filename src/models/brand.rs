//! Asset brands and their display metadata.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize, Serializer};

/// Source of brand identities. Never reused within a process.
static NEXT_BRAND_ID: AtomicU64 = AtomicU64::new(1);

/// Display metadata published alongside a brand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    /// Number of decimal places a whole unit is split into, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_places: Option<u32>,
}

impl DisplayInfo {
    #[must_use]
    pub const fn with_decimals(decimal_places: u32) -> Self {
        Self {
            decimal_places: Some(decimal_places),
        }
    }
}

struct BrandInner {
    id: u64,
    name: String,
    display_info: DisplayInfo,
}

/// Opaque identifier for a fungible unit type.
///
/// Brands compare by identity: two brands minted with the same alleged
/// name are still distinct. Cloning a `Brand` yields another reference to
/// the same identity.
#[derive(Clone)]
pub struct Brand {
    inner: Arc<BrandInner>,
}

impl Brand {
    /// Mints a fresh brand identity.
    pub fn new(name: impl Into<String>, display_info: DisplayInfo) -> Self {
        Self {
            inner: Arc::new(BrandInner {
                id: NEXT_BRAND_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                display_info,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The display name the brand claims. Not unique.
    #[must_use]
    pub fn alleged_name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn display_info(&self) -> DisplayInfo {
        self.inner.display_info
    }
}

impl PartialEq for Brand {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Brand {}

impl Hash for Brand {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl PartialOrd for Brand {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Brand {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.inner.id.cmp(&other.inner.id)
    }
}

impl fmt::Debug for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Brand({}#{})", self.inner.name, self.inner.id)
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

/// Brands serialize as their alleged name; identity does not leave the process.
impl Serialize for Brand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.inner.name)
    }
}

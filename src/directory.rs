//! Address directory used to deliver the registration invitation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::invitation::RegistrationInvitation;
use crate::{OnrampError, Result};

/// Endpoint that accepts invitations on behalf of an account.
pub trait DepositFacet: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the invitation could not be accepted.
    fn receive(&self, invitation: RegistrationInvitation) -> Result<()>;
}

/// Resolves an account address to one of its named facets.
pub trait NameDirectory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`OnrampError::DeliveryFailure`] if the address or facet is
    /// not known.
    fn lookup(&self, address: &str, facet: &str) -> Result<Arc<dyn DepositFacet>>;
}

/// In-process [`NameDirectory`].
#[derive(Default)]
pub struct MemoryDirectory {
    entries: RwLock<HashMap<(String, String), Arc<dyn DepositFacet>>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `facet` under `address`, replacing any previous entry.
    pub fn insert(&self, address: &str, name: &str, facet: Arc<dyn DepositFacet>) {
        debug!(address, facet = name, "Directory entry added");
        self.entries
            .write()
            .insert((address.to_string(), name.to_string()), facet);
    }
}

impl NameDirectory for MemoryDirectory {
    fn lookup(&self, address: &str, facet: &str) -> Result<Arc<dyn DepositFacet>> {
        self.entries
            .read()
            .get(&(address.to_string(), facet.to_string()))
            .cloned()
            .ok_or_else(|| OnrampError::DeliveryFailure {
                address: address.to_string(),
                reason: format!("no {facet} registered"),
            })
    }
}

/// Deposit facet that holds received invitations until taken.
#[derive(Default)]
pub struct InvitationPurse {
    held: Mutex<Vec<RegistrationInvitation>>,
}

impl InvitationPurse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the oldest held invitation.
    pub fn take(&self) -> Option<RegistrationInvitation> {
        let mut held = self.held.lock();
        if held.is_empty() {
            None
        } else {
            Some(held.remove(0))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.lock().is_empty()
    }
}

impl DepositFacet for InvitationPurse {
    fn receive(&self, invitation: RegistrationInvitation) -> Result<()> {
        debug!(serial = invitation.serial(), "Invitation deposited");
        self.held.lock().push(invitation);
        Ok(())
    }
}

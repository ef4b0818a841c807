//! In-memory profile store for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use outreach_shared::ProfileSubscription;
use uuid::Uuid;

use super::{ProfileStore, SubscriptionUpdate};
use crate::error::{BillingError, BillingResult};

#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    profiles: Arc<Mutex<HashMap<Uuid, ProfileSubscription>>>,
    writes: Arc<AtomicUsize>,
    fail_updates: Arc<AtomicBool>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: ProfileSubscription) {
        self.profiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(profile.user_id, profile);
    }

    pub fn get(&self, user_id: Uuid) -> Option<ProfileSubscription> {
        self.profiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `update_subscription` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent update fail with a store error
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<ProfileSubscription>> {
        let profiles = self.profiles.lock().unwrap_or_else(|e| e.into_inner());
        Ok(profiles
            .values()
            .find(|p| p.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn update_subscription(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> BillingResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(BillingError::Store("simulated update failure".to_string()));
        }

        let mut profiles = self.profiles.lock().unwrap_or_else(|e| e.into_inner());
        let profile = profiles
            .get_mut(&user_id)
            .ok_or(BillingError::ProfileNotFound(user_id))?;
        update.apply_to(profile);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

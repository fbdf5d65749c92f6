//! Identity reconciliation
//!
//! Converges the local user record toward the identity provider's claims
//! on every authenticated request, with minimal-write semantics: fields
//! change only when the claim carries a non-empty value that differs from
//! what is stored, and the save is skipped entirely when nothing changed.
//! `role` belongs to this system and is never touched here.

use chrono::Utc;
use tracing::{debug, info};

use crate::auth::Claims;
use crate::store::{IdentityRecord, Role, Store, StoreError};

const PLACEHOLDER_DOMAIN: &str = "@example.com";

/// A generated address marking "no real email yet". Never treated as
/// authoritative, and never allowed to replace a real address.
pub fn is_synthetic_email(email: &str) -> bool {
    email.ends_with(PLACEHOLDER_DOMAIN)
}

fn synthetic_email(external_id: &str) -> String {
    format!("{}{}", external_id, PLACEHOLDER_DOMAIN)
}

fn full_name(given: &str, family: &str) -> String {
    [given, family]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reconcile provider claims into the local record, creating it lazily on
/// the first request for an unseen `external_id`.
pub async fn reconcile(store: &dyn Store, claims: &Claims) -> Result<IdentityRecord, StoreError> {
    if let Some(existing) = store.find_user(&claims.external_id).await? {
        return apply_updates(store, existing, claims).await;
    }

    let record = provision(claims, None);
    match store.insert_user(&record).await {
        Ok(()) => {
            info!("Provisioned user: external_id={}", record.external_id);
            Ok(record)
        }
        Err(StoreError::Conflict) => {
            // Either a concurrent first request created the record, or the
            // claimed email address already belongs to another account.
            if let Some(existing) = store.find_user(&claims.external_id).await? {
                debug!(
                    "Provisioning race for external_id={}; converging on existing record",
                    claims.external_id
                );
                return apply_updates(store, existing, claims).await;
            }

            let fallback = provision(claims, Some(synthetic_email(&claims.external_id)));
            match store.insert_user(&fallback).await {
                Ok(()) => {
                    info!(
                        "Provisioned user with placeholder email: external_id={}",
                        fallback.external_id
                    );
                    Ok(fallback)
                }
                Err(StoreError::Conflict) => match store.find_user(&claims.external_id).await? {
                    Some(existing) => apply_updates(store, existing, claims).await,
                    None => Err(StoreError::Conflict),
                },
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

fn provision(claims: &Claims, email_override: Option<String>) -> IdentityRecord {
    let given = claims.given_name.as_deref().unwrap_or("");
    let family = claims.family_name.as_deref().unwrap_or("");
    let name = full_name(given, family);

    IdentityRecord {
        external_id: claims.external_id.clone(),
        first_name: if given.is_empty() { "User".into() } else { given.into() },
        last_name: family.into(),
        display_name: if name.is_empty() { "User".into() } else { name },
        email: email_override.unwrap_or_else(|| {
            claims
                .email
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| synthetic_email(&claims.external_id))
        }),
        avatar_url: claims.avatar_url.clone().unwrap_or_default(),
        role: Role::Participant,
        created_at: Utc::now(),
    }
}

/// Opportunistic update path: copy over changed claim fields, skip the
/// write when nothing differs.
async fn apply_updates(
    store: &dyn Store,
    mut record: IdentityRecord,
    claims: &Claims,
) -> Result<IdentityRecord, StoreError> {
    let mut dirty = false;

    let given = claims.given_name.as_deref().unwrap_or("");
    if !given.is_empty() && record.first_name != given {
        record.first_name = given.to_string();
        dirty = true;
    }

    let family = claims.family_name.as_deref().unwrap_or("");
    if !family.is_empty() && record.last_name != family {
        record.last_name = family.to_string();
        dirty = true;
    }

    let name = full_name(given, family);
    if !name.is_empty() && record.display_name != name {
        record.display_name = name;
        dirty = true;
    }

    // A real address is never downgraded to a placeholder.
    let previous_email = record.email.clone();
    let email = claims.email.as_deref().unwrap_or("");
    if !email.is_empty() && record.email != email && !is_synthetic_email(email) {
        record.email = email.to_string();
        dirty = true;
    }

    let avatar = claims.avatar_url.as_deref().unwrap_or("");
    if !avatar.is_empty() && record.avatar_url != avatar {
        record.avatar_url = avatar.to_string();
        dirty = true;
    }

    if dirty {
        match store.save_user(&record).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                // The claimed address belongs to another account. Email
                // stays unique across records, so keep ours and sync the
                // remaining fields.
                debug!(
                    "Email claim for external_id={} already held; retaining stored address",
                    record.external_id
                );
                record.email = previous_email;
                store.save_user(&record).await?;
            }
            Err(e) => return Err(e),
        }
        debug!("Synced user fields: external_id={}", record.external_id);
    }

    Ok(record)
}

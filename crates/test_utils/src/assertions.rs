//! Custom Test Assertions
//!
//! Assertions over sync outcomes and the traffic a [`MockCrm`] recorded,
//! with failure messages that say what actually happened.

use domain_sync::{CrmAction, CrmEntity, MockCrm, SyncFailure, SyncResult};
use domain_sync::SyncErrorKind;

/// Asserts that the order was synced by this delivery
pub fn assert_synced(result: &SyncResult) {
    assert!(
        !result.skipped,
        "Expected order {} to be synced, but it was skipped",
        result.order_id
    );
    assert!(
        result.contact_id.is_some() && result.contribution_id.is_some(),
        "Synced order {} is missing ids: contact={:?} contribution={:?}",
        result.order_id,
        result.contact_id,
        result.contribution_id
    );
}

/// Asserts that the delivery was skipped as a duplicate
pub fn assert_skipped(result: &SyncResult) {
    assert!(
        result.skipped,
        "Expected order {} to be skipped, but it was synced as contribution {:?}",
        result.order_id,
        result.contribution_id
    );
}

/// Asserts the failure kind
pub fn assert_failed_with(failure: &SyncFailure, kind: SyncErrorKind) {
    assert_eq!(
        failure.kind(),
        kind,
        "Expected {} failure, got {} at stage {}: {}",
        kind,
        failure.kind(),
        failure.stage,
        failure.error
    );
}

/// Asserts how many contributions the CRM holds
pub async fn assert_contribution_count(crm: &MockCrm, expected: usize) {
    let actual = crm.records(CrmEntity::Contribution).await.len();
    assert_eq!(
        actual, expected,
        "Expected {} contributions in the CRM, found {}",
        expected, actual
    );
}

/// Asserts that no create or update request reached the CRM
pub async fn assert_no_crm_writes(crm: &MockCrm) {
    let writes: Vec<String> = crm
        .requests()
        .await
        .iter()
        .filter(|r| r.action().is_write())
        .map(|r| r.path())
        .collect();
    assert!(writes.is_empty(), "Expected no CRM writes, got {:?}", writes);
}

/// Asserts how many requests of one kind the CRM received
pub async fn assert_request_count(crm: &MockCrm, entity: CrmEntity, action: CrmAction, expected: usize) {
    let actual = crm.request_count(entity, action).await;
    assert_eq!(
        actual, expected,
        "Expected {} {}.{} requests, got {}",
        expected, entity, action, actual
    );
}

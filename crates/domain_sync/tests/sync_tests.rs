//! End-to-end synchronization tests against the scripted CRM

use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde_json::json;

use domain_sync::{
    ContributionDefaults, CrmAction, CrmEntity, CrmError, FieldMappingTable, InMemorySyncRecordStore,
    SyncConfig, SyncErrorKind, SyncOrchestrator, SyncStage, TargetEntity,
};
use test_utils::*;

struct Harness {
    orchestrator: SyncOrchestrator,
    crm: Arc<MockCrm>,
    store: InMemorySyncRecordStore,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SettingsFixtures::config())
    }

    fn with_config(config: SyncConfig) -> Self {
        let crm = Arc::new(MockCrm::new());
        let store = InMemorySyncRecordStore::new();
        let orchestrator = SyncOrchestrator::new(&config, crm.clone(), Arc::new(store.clone()));
        Self {
            orchestrator,
            crm,
            store,
        }
    }
}

mod happy_path {
    use super::*;

    #[tokio::test]
    async fn test_new_customer_gets_contact_and_contribution() {
        let h = Harness::new();
        let order = OrderFixtures::completed();

        let result = h.orchestrator.synchronize(&order).await.unwrap();
        assert_synced(&result);
        assert_request_count(&h.crm, CrmEntity::Contact, CrmAction::Create, 1).await;
        assert_contribution_count(&h.crm, 1).await;

        let contribution = &h.crm.records(CrmEntity::Contribution).await[0];
        assert_eq!(contribution["contact_id"], json!(result.contact_id.unwrap().get()));
        assert_eq!(contribution["total_amount"], json!(25.0));
        assert_eq!(contribution["currency"], json!("USD"));
        assert_eq!(contribution["financial_type_id"], json!(1));
        assert_eq!(contribution["payment_instrument_id"], json!(1));
        assert_eq!(contribution["source"], json!("WooCommerce Order #1001"));
        assert_eq!(contribution["invoice_number"], json!("1001"));
        assert_eq!(contribution["trxn_id"], json!("ch_3PxT2aLkdIwHu7ix"));
        assert_eq!(
            contribution["receive_date"],
            json!(TimeFixtures::order_placed_receive_date())
        );
        assert_eq!(h.store.synced_count().await, 1);
    }

    #[tokio::test]
    async fn test_string_total_is_sent_as_number() {
        let h = Harness::new();
        h.orchestrator
            .synchronize(&OrderFixtures::nineteen_ninety_nine())
            .await
            .unwrap();

        let contribution = &h.crm.records(CrmEntity::Contribution).await[0];
        assert_eq!(contribution["total_amount"], json!(19.99));
    }

    #[tokio::test]
    async fn test_mapped_numeric_targets_are_submitted_as_numbers() {
        let table = FieldMappingTable::default_table()
            .with("order_number", "financial_type_id", TargetEntity::Contribution)
            .with("order_total", "fee_amount", TargetEntity::Contribution);
        let h = Harness::with_config(SettingsFixtures::config().with_field_mappings(table));
        let order = OrderEventBuilder::new()
            .with_order_id("4")
            .with_total(dec!(19.99))
            .build();

        h.orchestrator.synchronize(&order).await.unwrap();

        let contribution = &h.crm.records(CrmEntity::Contribution).await[0];
        assert!(contribution["financial_type_id"].is_i64());
        assert_eq!(contribution["financial_type_id"], json!(4));
        assert!(contribution["fee_amount"].is_f64());
        assert_eq!(contribution["fee_amount"], json!(19.99));
        assert!(contribution["total_amount"].is_f64());
        assert!(contribution["contact_id"].is_i64());
    }

    #[tokio::test]
    async fn test_shipping_details_are_not_written_to_contact() {
        let h = Harness::new();
        h.orchestrator
            .synchronize(&OrderFixtures::with_shipping())
            .await
            .unwrap();

        let contact = &h.crm.records(CrmEntity::Contact).await[0];
        assert!(contact.keys().all(|k| !k.starts_with("shipping_")));
        let address = &h.crm.records(CrmEntity::Address).await[0];
        assert_eq!(address["city"], json!("Leeds"));
        assert_eq!(address["country_id"], json!("GB"));
    }

    #[tokio::test]
    async fn test_free_order_still_syncs() {
        let h = Harness::new();
        let result = h.orchestrator.synchronize(&OrderFixtures::free()).await.unwrap();
        assert_synced(&result);
        let contribution = &h.crm.records(CrmEntity::Contribution).await[0];
        assert_eq!(contribution["total_amount"], json!(0.0));
    }

    #[tokio::test]
    async fn test_company_creates_organization_contact() {
        let h = Harness::new();
        h.orchestrator
            .synchronize(&OrderFixtures::organization())
            .await
            .unwrap();

        let contacts = h.crm.records(CrmEntity::Contact).await;
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0]["contact_type"], json!("Organization"));
        assert_eq!(contacts[0]["organization_name"], json!("Acme Widgets Ltd"));
    }

    #[tokio::test]
    async fn test_payment_method_selects_instrument() {
        let h = Harness::new();
        let order = OrderEventBuilder::new()
            .with_order_id("6000")
            .with_payment_method(Some("PayPal"))
            .build();
        h.orchestrator.synchronize(&order).await.unwrap();

        let contribution = &h.crm.records(CrmEntity::Contribution).await[0];
        assert_eq!(contribution["payment_instrument_id"], json!(2));
    }

    #[tokio::test]
    async fn test_configured_defaults_are_applied() {
        let config = SettingsFixtures::config().with_contribution_defaults(ContributionDefaults {
            financial_type_id: 4,
            contribution_status_id: 2,
            is_pay_later: true,
        });
        let h = Harness::with_config(config);
        h.orchestrator.synchronize(&OrderFixtures::completed()).await.unwrap();

        let contribution = &h.crm.records(CrmEntity::Contribution).await[0];
        assert_eq!(contribution["financial_type_id"], json!(4));
        assert_eq!(contribution["contribution_status_id"], json!(2));
        assert_eq!(contribution["is_pay_later"], json!(1));
    }
}

mod contact_resolution {
    use super::*;

    #[tokio::test]
    async fn test_existing_email_owner_is_reused() {
        let h = Harness::new();
        let owner = CrmFixtures::with_email_owner(&h.crm, "jane.doe@example.com", "Janet", "Doe-Smith").await;

        let result = h.orchestrator.synchronize(&OrderFixtures::completed()).await.unwrap();
        assert_eq!(result.contact_id.map(|id| id.get()), Some(owner));
        assert_request_count(&h.crm, CrmEntity::Contact, CrmAction::Create, 0).await;
    }

    #[tokio::test]
    async fn test_email_match_wins_over_name_match() {
        let h = Harness::new();
        let by_name = CrmFixtures::with_named_contact(&h.crm, "Jane", "Doe").await;
        let by_email = CrmFixtures::with_email_owner(&h.crm, "jane.doe@example.com", "J", "Doe").await;
        assert_ne!(by_name, by_email);

        let result = h.orchestrator.synchronize(&OrderFixtures::completed()).await.unwrap();
        assert_eq!(result.contact_id.map(|id| id.get()), Some(by_email));
    }

    #[tokio::test]
    async fn test_name_match_when_email_is_unknown() {
        let h = Harness::new();
        let by_name = CrmFixtures::with_named_contact(&h.crm, "Jane", "Doe").await;

        let result = h.orchestrator.synchronize(&OrderFixtures::completed()).await.unwrap();
        assert_eq!(result.contact_id.map(|id| id.get()), Some(by_name));
        assert_request_count(&h.crm, CrmEntity::Contact, CrmAction::Create, 0).await;
    }

    #[tokio::test]
    async fn test_missing_required_fields_reject_without_writes() {
        let h = Harness::new();
        let order = OrderFixtures::without_email();

        let failure = h.orchestrator.synchronize(&order).await.unwrap_err();
        assert_failed_with(&failure, SyncErrorKind::MissingRequiredField);
        assert_eq!(failure.stage, SyncStage::ResolvingContact);
        assert!(failure.error.to_string().contains("email"));
        assert_no_crm_writes(&h.crm).await;
        assert!(!h.orchestrator.guard().has_synced(&order.order_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_contact_creation_without_id_fails() {
        let h = Harness::new();
        h.crm.return_no_id_on_create(CrmEntity::Contact).await;

        let failure = h
            .orchestrator
            .synchronize(&OrderFixtures::completed())
            .await
            .unwrap_err();
        assert_failed_with(&failure, SyncErrorKind::ContactCreation);
        assert_contribution_count(&h.crm, 0).await;
    }
}

mod idempotency {
    use super::*;

    #[tokio::test]
    async fn test_repeat_delivery_is_skipped() {
        let h = Harness::new();
        let order = OrderFixtures::completed();

        let first = h.orchestrator.synchronize(&order).await.unwrap();
        let writes = h.crm.write_count().await;
        let second = h.orchestrator.synchronize(&order).await.unwrap();

        assert_skipped(&second);
        assert_eq!(second.contribution_id, first.contribution_id);
        assert_eq!(second.contact_id, first.contact_id);
        assert_eq!(h.crm.write_count().await, writes);
        assert_contribution_count(&h.crm, 1).await;
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_delivery_writes_once() {
        let h = Harness::new();
        let order = OrderFixtures::completed();

        let (a, b) = tokio::join!(
            h.orchestrator.synchronize(&order),
            h.orchestrator.synchronize(&order)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.skipped != b.skipped, "exactly one delivery must win");
        assert_contribution_count(&h.crm, 1).await;
        assert_eq!(h.store.synced_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_sync_can_be_retried() {
        let h = Harness::new();
        let order = OrderFixtures::completed();
        h.crm
            .fail_next(
                CrmEntity::Contribution,
                CrmAction::Create,
                CrmError::network("https://crm.example.org", "connection reset", true),
            )
            .await;

        let failure = h.orchestrator.synchronize(&order).await.unwrap_err();
        assert_failed_with(&failure, SyncErrorKind::Network);
        assert!(failure.is_retryable());

        let result = h.orchestrator.synchronize(&order).await.unwrap();
        assert_synced(&result);
        assert_contribution_count(&h.crm, 1).await;
    }

    #[tokio::test]
    async fn test_distinct_orders_sync_independently() {
        let h = Harness::new();
        for id in ["10", "11", "12"] {
            assert_synced(&h.orchestrator.synchronize(&OrderFixtures::with_id(id)).await.unwrap());
        }
        assert_contribution_count(&h.crm, 3).await;
        // Same customer every time: created once, matched by email afterwards.
        assert_request_count(&h.crm, CrmEntity::Contact, CrmAction::Create, 1).await;
    }
}

mod contribution_fallback {
    use super::*;

    #[tokio::test]
    async fn test_constraint_violation_falls_back_to_reduced_payload() {
        let h = Harness::new();
        h.crm
            .fail_next(
                CrmEntity::Contribution,
                CrmAction::Create,
                CrmError::remote(Some(500), "'Foo' is not a valid option for field payment_instrument_id"),
            )
            .await;

        let result = h.orchestrator.synchronize(&OrderFixtures::completed()).await.unwrap();
        assert_synced(&result);

        let contributions = h.crm.records(CrmEntity::Contribution).await;
        assert_eq!(contributions.len(), 1);
        assert!(contributions[0].get("payment_instrument_id").is_none());
        assert_request_count(&h.crm, CrmEntity::Contribution, CrmAction::Create, 2).await;
    }

    #[tokio::test]
    async fn test_authorization_error_is_not_retried() {
        let h = Harness::new();
        h.crm
            .fail_next(
                CrmEntity::Contribution,
                CrmAction::Create,
                CrmError::remote(Some(403), "Authorization failed"),
            )
            .await;

        let failure = h
            .orchestrator
            .synchronize(&OrderFixtures::completed())
            .await
            .unwrap_err();
        assert_failed_with(&failure, SyncErrorKind::RemoteApi);
        assert_eq!(failure.stage, SyncStage::CreatingContribution);
        assert_request_count(&h.crm, CrmEntity::Contribution, CrmAction::Create, 1).await;
    }
}

mod settings {
    use super::*;

    #[tokio::test]
    async fn test_stored_mapping_table_drives_sync() {
        let table = FieldMappingTable::default_table()
            .with("order_notes", "note", TargetEntity::Contribution)
            .with("payment_method", "payment_method_label", TargetEntity::Contribution);
        let store = SettingsFixtures::store_with_mappings(&table).await;
        let config = SyncConfig::load(&store).await.unwrap();

        let h = Harness::with_config(config);
        let order = OrderEventBuilder::new().with_note("Gift aid please").build();
        h.orchestrator.synchronize(&order).await.unwrap();

        let contribution = &h.crm.records(CrmEntity::Contribution).await[0];
        assert_eq!(contribution["note"], json!("Gift aid please"));
        assert_eq!(contribution["payment_method_label"], json!("stripe"));
    }

    #[tokio::test]
    async fn test_table_without_name_mappings_cannot_resolve_contacts() {
        let table = FieldMappingTable::new().with("billing_email", "email", TargetEntity::Contact);
        let store = SettingsFixtures::store_with_mappings(&table).await;
        let h = Harness::with_config(SyncConfig::load(&store).await.unwrap());

        let failure = h
            .orchestrator
            .synchronize(&OrderFixtures::completed())
            .await
            .unwrap_err();
        assert_failed_with(&failure, SyncErrorKind::MissingRequiredField);
        assert_no_crm_writes(&h.crm).await;
    }
}

proptest! {
    #[test]
    fn test_totals_coerce_to_matching_floats(total in order_total_strategy()) {
        let order = OrderEventBuilder::new().with_total(total).build();
        let mapped = FieldMappingTable::default_table().resolve(&order);

        let sent = mapped.contribution["total_amount"].as_f64();
        prop_assert!(sent.is_some(), "total_amount was not numeric");
        prop_assert_eq!(sent, total.normalize().to_f64());
        prop_assert!((sent.unwrap_or_default() - total.to_f64().unwrap_or_default()).abs() < 0.005);
    }

    #[test]
    fn test_every_present_source_is_mapped(
        table in mapping_table_strategy(),
        order in order_event_strategy(),
    ) {
        let mapped = table.resolve(&order);
        for entry in table.iter() {
            if order.field(&entry.source_field).is_none() {
                continue;
            }
            let bucket = match entry.target.entity {
                TargetEntity::Contact => &mapped.contact,
                TargetEntity::Contribution => &mapped.contribution,
            };
            prop_assert!(
                bucket.contains_key(&entry.target.target_field),
                "{} -> {} missing",
                entry.source_field,
                entry.target.target_field
            );
        }
    }
}

#[test]
fn test_fixture_totals() {
    assert_eq!(OrderFixtures::nineteen_ninety_nine().total_amount, dec!(19.99));
    assert_eq!(OrderFixtures::free().total_amount, dec!(0.00));
}

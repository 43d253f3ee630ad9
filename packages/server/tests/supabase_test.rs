use serde_json::json;
use std::collections::BTreeSet;
use werewolf_rules::{PlayerId, Role};
use werewolf_server::{
    error::ExternalError,
    services::{
        entitlement::{owned_roles, EntitlementStore, SupabaseEntitlements},
        rewards::{RewardSink, SupabaseRewards},
        supabase::SupabaseRest,
    },
    utils::config::SupabaseConfig,
};
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn rest(server: &MockServer) -> SupabaseRest {
    SupabaseRest::new(&SupabaseConfig {
        url: server.uri(),
        key: "service-key".to_string(),
    })
}

#[tokio::test]
async fn test_entitlement_lookup_uses_the_service_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/role_entitlements"))
        .and(query_param("user_id", "eq.7"))
        .and(query_param("role", "eq.seer"))
        .and(header("apikey", "service-key"))
        .and(header("Authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "user_id": 7, "role": "seer" }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/role_entitlements"))
        .and(query_param("role", "eq.witch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = SupabaseEntitlements::new(rest(&mock_server));
    assert!(store.owns(PlayerId(7), Role::Seer).await.unwrap());
    assert!(!store.owns(PlayerId(7), Role::Witch).await.unwrap());
}

#[tokio::test]
async fn test_entitlement_errors_fail_closed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/role_entitlements"))
        .and(query_param("role", "eq.hunter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "role": "hunter" }])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/role_entitlements"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let store = SupabaseEntitlements::new(rest(&mock_server));
    match store.owns(PlayerId(1), Role::Cupid).await {
        Err(ExternalError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected result {:?}", other),
    }

    let owned = owned_roles(&store, PlayerId(1), &Role::OPTIONAL).await;
    assert_eq!(owned, BTreeSet::from([Role::Hunter]));
}

#[tokio::test]
async fn test_reward_grant_calls_the_ledger_function() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/grant_reward"))
        .and(header("apikey", "service-key"))
        .and(body_json(json!({
            "user_id": 3,
            "amount": 100,
            "reason": "werewolf victory (The village)"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let rewards = SupabaseRewards::new(rest(&mock_server));
    rewards
        .grant(PlayerId(3), 100, "werewolf victory (The village)")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reward_grant_reports_ledger_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/grant_reward"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown user"))
        .mount(&mock_server)
        .await;

    let rewards = SupabaseRewards::new(rest(&mock_server));
    let result = rewards.grant(PlayerId(3), 100, "test").await;
    assert!(matches!(
        result,
        Err(ExternalError::Status { status: 400, .. })
    ));
}

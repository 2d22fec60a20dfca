//! Tenant resolution and authorization engine tests.

mod common;

use axum::http::StatusCode;
use common::*;
use crewdeck::authz::{self, ALL_ROLES, MANAGER_ROLES};
use tower::ServiceExt;

// ------------------------------------------------------------------------
// authorize() decision table
// ------------------------------------------------------------------------

#[test]
fn owner_is_authorized_regardless_of_membership_rows() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "Acme");

    let conn = state.db.get().unwrap();

    // Wipe the owner's membership row entirely - ownership alone must grant.
    conn.execute(
        "DELETE FROM memberships WHERE user_id = ?1 AND org_id = ?2",
        rusqlite::params![owner.id, org.id],
    )
    .unwrap();

    assert!(authz::authorize(&conn, Some(&owner), &org, MANAGER_ROLES));
    assert!(authz::authorize(&conn, Some(&owner), &org, ALL_ROLES));
}

#[test]
fn inactive_membership_denies() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (admin, _) = register_test_user(&state, "admin@example.com");
    let org = create_test_org(&state, &owner, "Acme");
    let membership = add_test_member(&state, &org, &owner, &admin, MembershipRole::Admin);

    let conn = state.db.get().unwrap();
    assert!(authz::authorize(&conn, Some(&admin), &org, MANAGER_ROLES));

    queries::deactivate_membership(&conn, &membership.id).unwrap();
    assert!(!authz::authorize(&conn, Some(&admin), &org, MANAGER_ROLES));
    assert!(!authz::authorize(&conn, Some(&admin), &org, ALL_ROLES));
}

#[test]
fn unauthenticated_and_non_members_deny() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (stranger, _) = register_test_user(&state, "stranger@example.com");
    let org = create_test_org(&state, &owner, "Acme");

    let conn = state.db.get().unwrap();
    assert!(!authz::authorize(&conn, None, &org, ALL_ROLES));
    assert!(!authz::authorize(&conn, Some(&stranger), &org, ALL_ROLES));
}

#[test]
fn member_role_is_not_a_manager() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (member, _) = register_test_user(&state, "member@example.com");
    let org = create_test_org(&state, &owner, "Acme");
    add_test_member(&state, &org, &owner, &member, MembershipRole::Member);

    let conn = state.db.get().unwrap();
    assert!(authz::authorize(&conn, Some(&member), &org, ALL_ROLES));
    assert!(!authz::authorize(&conn, Some(&member), &org, MANAGER_ROLES));
}

// ------------------------------------------------------------------------
// Tenant resolution
// ------------------------------------------------------------------------

#[tokio::test]
async fn missing_tenant_header_forbids_tenant_scoped_endpoints() {
    let (state, _rx) = create_test_app_state();
    let (owner, key) = register_test_user(&state, "owner@example.com");
    create_test_org(&state, &owner, "Acme");

    let response = app(state)
        .oneshot(get("/memberships").api_key(&key).build())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_tenant_id_aborts_before_business_logic() {
    let (state, _rx) = create_test_app_state();
    let (_, key) = register_test_user(&state, "owner@example.com");

    let response = app(state)
        .oneshot(
            get("/memberships")
                .api_key(&key)
                .org("00000000-0000-0000-0000-000000000000")
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Invalid organization");
}

#[tokio::test]
async fn inactive_org_does_not_resolve() {
    let (state, _rx) = create_test_app_state();
    let (owner, key) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "Acme");

    {
        let conn = state.db.get().unwrap();
        conn.execute(
            "UPDATE organizations SET is_active = 0 WHERE id = ?1",
            rusqlite::params![org.id],
        )
        .unwrap();
    }

    let response = app(state)
        .oneshot(get("/memberships").api_key(&key).org(&org.id).build())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tenant_query_param_fallback_resolves() {
    let (state, _rx) = create_test_app_state();
    let (owner, key) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "Acme");

    let response = app(state)
        .oneshot(
            get(format!("/memberships?org_id={}", org.id))
                .api_key(&key)
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_independent_endpoints_work_without_header() {
    let (state, _rx) = create_test_app_state();
    let (user, key) = register_test_user(&state, "someone@example.com");

    let response = app(state)
        .oneshot(get("/auth/me").api_key(&key).build())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["email"], user.email);
    // The API key hash must never serialize.
    assert!(body.get("api_key_hash").is_none());
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let (state, _rx) = create_test_app_state();

    let response = app(state).oneshot(get("/auth/me").build()).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ------------------------------------------------------------------------
// Organization endpoints obey the engine
// ------------------------------------------------------------------------

#[tokio::test]
async fn org_hidden_from_non_members() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (_, stranger_key) = register_test_user(&state, "stranger@example.com");
    let org = create_test_org(&state, &owner, "Acme");

    let response = app(state)
        .oneshot(
            get(format!("/organizations/{}", org.id))
                .api_key(&stranger_key)
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_org_returns_owner_membership_and_audit() {
    let (state, _rx) = create_test_app_state();
    let (user, key) = register_test_user(&state, "founder@example.com");

    let response = app(state.clone())
        .oneshot(
            post("/organizations")
                .api_key(&key)
                .json(serde_json::json!({ "name": "New Venture" }))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let org_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["slug"], "new-venture");
    assert_eq!(body["owner_id"], user.id);

    let conn = state.db.get().unwrap();
    let membership = queries::get_active_membership(&conn, &user.id, &org_id)
        .unwrap()
        .expect("owner membership should exist");
    assert_eq!(membership.role, MembershipRole::Owner);

    assert_eq!(count_audit_records(&state, &org_id, "create_organization"), 1);
}

#[tokio::test]
async fn update_org_requires_manager_role() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (member, member_key) = register_test_user(&state, "member@example.com");
    let org = create_test_org(&state, &owner, "Acme");
    add_test_member(&state, &org, &owner, &member, MembershipRole::Member);

    let response = app(state)
        .oneshot(
            put(format!("/organizations/{}", org.id))
                .api_key(&member_key)
                .json(serde_json::json!({ "name": "Renamed" }))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

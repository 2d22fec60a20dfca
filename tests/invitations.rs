//! Invitation lifecycle tests: create guards, accept/reject transitions,
//! identity binding, and the single-winner guarantee.

mod common;

use axum::http::StatusCode;
use common::*;
use crewdeck::error::AppError;
use tower::ServiceExt;

fn pending_invite(
    state: &AppState,
    org: &Organization,
    inviter: &User,
    email: &str,
    role: MembershipRole,
) -> Invitation {
    let conn = state.db.get().unwrap();
    let invited_user = queries::get_user_by_email(&conn, email).unwrap();
    queries::create_invitation(
        &conn,
        &org.id,
        &inviter.id,
        invited_user.as_ref().map(|u| u.id.as_str()),
        &CreateInvitation {
            email: email.to_string(),
            role,
            expires_in_days: None,
        },
    )
    .unwrap()
}

// ------------------------------------------------------------------------
// Creation guards
// ------------------------------------------------------------------------

#[tokio::test]
async fn invite_requires_manager_role() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (member, member_key) = register_test_user(&state, "member@example.com");
    let org = create_test_org(&state, &owner, "Acme");
    add_test_member(&state, &org, &owner, &member, MembershipRole::Member);

    let response = app(state.clone())
        .oneshot(
            post("/invitations")
                .api_key(&member_key)
                .org(&org.id)
                .json(serde_json::json!({ "email": "new@example.com", "role": "member" }))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(count_audit_records(&state, &org.id, "invite_sent"), 0);
}

#[tokio::test]
async fn admin_cannot_grant_a_role_above_their_own() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (admin, admin_key) = register_test_user(&state, "admin@example.com");
    let org = create_test_org(&state, &owner, "Acme");
    add_test_member(&state, &org, &owner, &admin, MembershipRole::Admin);

    let response = app(state)
        .oneshot(
            post("/invitations")
                .api_key(&admin_key)
                .org(&org.id)
                .json(serde_json::json!({ "email": "new@example.com", "role": "owner" }))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn owner_invites_admin_with_audit_record() {
    let (state, _rx) = create_test_app_state();
    let (owner, owner_key) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "Acme");

    let response = app(state.clone())
        .oneshot(
            post("/invitations")
                .api_key(&owner_key)
                .org(&org.id)
                .json(serde_json::json!({ "email": "alice@x.com", "role": "admin" }))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["accepted"], false);
    assert_eq!(body["role"], "admin");
    assert_eq!(count_audit_records(&state, &org.id, "invite_sent"), 1);
}

// ------------------------------------------------------------------------
// Accept
// ------------------------------------------------------------------------

#[tokio::test]
async fn accept_creates_membership_and_second_accept_sees_not_found() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (alice, alice_key) = register_test_user(&state, "alice@x.com");
    let org = create_test_org(&state, &owner, "org1");
    let invitation = pending_invite(&state, &org, &owner, "alice@x.com", MembershipRole::Admin);

    let response = app(state.clone())
        .oneshot(
            post(format!("/invitations/{}/accept", invitation.id))
                .api_key(&alice_key)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["invitation"]["accepted"], true);
    assert_eq!(body["membership"]["role"], "admin");

    {
        let conn = state.db.get().unwrap();
        let membership = queries::get_active_membership(&conn, &alice.id, &org.id)
            .unwrap()
            .expect("membership should exist after accept");
        assert_eq!(membership.role, MembershipRole::Admin);
        assert!(membership.is_active);

        // Exactly one membership row for the pair.
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memberships WHERE user_id = ?1 AND org_id = ?2",
                rusqlite::params![alice.id, org.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);
    }

    // The losing (second) accept observes NotFound.
    let response = app(state.clone())
        .oneshot(
            post(format!("/invitations/{}/accept", invitation.id))
                .api_key(&alice_key)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Exactly one invite_accepted audit record.
    assert_eq!(count_audit_records(&state, &org.id, "invite_accepted"), 1);
}

#[tokio::test]
async fn accept_requires_matching_identity() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (_alice, _) = register_test_user(&state, "alice@x.com");
    let (_mallory, mallory_key) = register_test_user(&state, "mallory@x.com");
    let org = create_test_org(&state, &owner, "org1");
    let invitation = pending_invite(&state, &org, &owner, "alice@x.com", MembershipRole::Member);

    let response = app(state.clone())
        .oneshot(
            post(format!("/invitations/{}/accept", invitation.id))
                .api_key(&mallory_key)
                .build(),
        )
        .await
        .unwrap();

    // An invitation addressed to someone else behaves like a missing one.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(count_audit_records(&state, &org.id, "invite_accepted"), 0);
}

#[test]
fn losing_accept_at_query_level_observes_not_found() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (alice, _) = register_test_user(&state, "alice@x.com");
    let org = create_test_org(&state, &owner, "org1");
    let invitation = pending_invite(&state, &org, &owner, "alice@x.com", MembershipRole::Member);

    let mut conn = state.db.get().unwrap();
    queries::accept_invitation(&mut conn, &alice, &invitation.id).unwrap();

    let err = queries::accept_invitation(&mut conn, &alice, &invitation.id).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn expired_invitation_cannot_be_accepted() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (alice, _) = register_test_user(&state, "alice@x.com");
    let org = create_test_org(&state, &owner, "org1");
    let invitation = pending_invite(&state, &org, &owner, "alice@x.com", MembershipRole::Member);

    let mut conn = state.db.get().unwrap();
    conn.execute(
        "UPDATE invitations SET expires_at = 1 WHERE id = ?1",
        rusqlite::params![invitation.id],
    )
    .unwrap();

    let err = queries::accept_invitation(&mut conn, &alice, &invitation.id).unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Still pending: nothing was consumed.
    let still_there = queries::find_pending_invitation_for(&conn, &invitation.id, &alice).unwrap();
    assert!(still_there.is_some());
}

#[test]
fn accept_with_existing_membership_is_idempotent_role_update() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (alice, _) = register_test_user(&state, "alice@x.com");
    let org = create_test_org(&state, &owner, "org1");
    add_test_member(&state, &org, &owner, &alice, MembershipRole::Member);

    let invitation = pending_invite(&state, &org, &owner, "alice@x.com", MembershipRole::Admin);

    let mut conn = state.db.get().unwrap();
    let (_, membership) = queries::accept_invitation(&mut conn, &alice, &invitation.id).unwrap();
    assert_eq!(membership.role, MembershipRole::Admin);

    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM memberships WHERE user_id = ?1 AND org_id = ?2",
            rusqlite::params![alice.id, org.id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 1);
}

// ------------------------------------------------------------------------
// Reject
// ------------------------------------------------------------------------

#[tokio::test]
async fn reject_deletes_the_row_and_creates_no_membership() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (alice, alice_key) = register_test_user(&state, "alice@x.com");
    let org = create_test_org(&state, &owner, "org1");
    let invitation = pending_invite(&state, &org, &owner, "alice@x.com", MembershipRole::Admin);

    let response = app(state.clone())
        .oneshot(
            post(format!("/invitations/{}/reject", invitation.id))
                .api_key(&alice_key)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.db.get().unwrap();
    let gone: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM invitations WHERE id = ?1",
            rusqlite::params![invitation.id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(gone, 0);

    assert!(
        queries::get_active_membership(&conn, &alice.id, &org.id)
            .unwrap()
            .is_none()
    );
    assert_eq!(count_audit_records(&state, &org.id, "invite_rejected"), 1);

    // Rejecting again (or accepting) now fails.
    let response = app(state.clone())
        .oneshot(
            post(format!("/invitations/{}/reject", invitation.id))
                .api_key(&alice_key)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(count_audit_records(&state, &org.id, "invite_rejected"), 1);
}

#[tokio::test]
async fn pending_invitations_listed_for_invitee_only() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (_alice, alice_key) = register_test_user(&state, "alice@x.com");
    let (_bob, bob_key) = register_test_user(&state, "bob@x.com");
    let org = create_test_org(&state, &owner, "org1");
    pending_invite(&state, &org, &owner, "alice@x.com", MembershipRole::Member);

    let response = app(state.clone())
        .oneshot(get("/invitations").api_key(&alice_key).build())
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app(state)
        .oneshot(get("/invitations").api_key(&bob_key).build())
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

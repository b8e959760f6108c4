mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{
    add_member, as_uuid, call, create_lab, lab_role_id, register, sentinel_role_id, setup,
};

#[tokio::test]
async fn only_one_pending_request_per_lab() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (_, requester_token) = register(&app, "Rae", "rae@example.com").await?;

    let student_role = lab_role_id(&pool, "Student").await?;
    let body = json!({ "role_id": student_role });

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(body.clone()),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(body),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT, "{second}");
    assert_eq!(second["error"], "conflict");

    Ok(())
}

#[tokio::test]
async fn withdrawing_frees_the_pending_slot() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (_, requester_token) = register(&app, "Rae", "rae@example.com").await?;

    let student_role = lab_role_id(&pool, "Student").await?;
    let (_, admission) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    let admission_id = as_uuid(&admission["id"])?;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/withdraw"),
        Some(&requester_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // A withdrawn row is terminal, not blocking.
    let (status, reissued) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{reissued}");
    assert_ne!(as_uuid(&reissued["id"])?, admission_id);

    Ok(())
}

#[tokio::test]
async fn terminal_admissions_accept_no_further_transitions() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (_, requester_token) = register(&app, "Rae", "rae@example.com").await?;
    let (manager_id, manager_token) = register(&app, "Mina", "mina@example.com").await?;
    add_member(&pool, manager_id, lab_id, "Lab Manager").await?;

    let student_role = lab_role_id(&pool, "Student").await?;
    let (_, admission) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    let admission_id = as_uuid(&admission["id"])?;

    let (status, rejected) = call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/reject"),
        Some(&manager_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "REJECTED");

    for action in ["approve", "reject", "withdraw"] {
        let token = if action == "withdraw" {
            &requester_token
        } else {
            &manager_token
        };
        let payload = (action == "approve").then(|| json!({}));
        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/admissions/{admission_id}/{action}"),
            Some(token),
            payload,
        )
        .await?;
        assert_eq!(status, StatusCode::CONFLICT, "{action}: {body}");
        assert_eq!(body["error"], "invalid_state");
    }

    Ok(())
}

#[tokio::test]
async fn requests_validate_lab_and_role() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (_, requester_token) = register(&app, "Rae", "rae@example.com").await?;

    let student_role = lab_role_id(&pool, "Student").await?;
    let sentinel = sentinel_role_id(&pool).await?;

    let missing_lab = Uuid::new_v4();
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/labs/{missing_lab}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": Uuid::new_v4() })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The sentinel is never requestable.
    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": sentinel })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    Ok(())
}

#[tokio::test]
async fn approval_rejects_a_sentinel_role_override() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (_, requester_token) = register(&app, "Rae", "rae@example.com").await?;
    let (manager_id, manager_token) = register(&app, "Mina", "mina@example.com").await?;
    add_member(&pool, manager_id, lab_id, "Lab Manager").await?;

    let student_role = lab_role_id(&pool, "Student").await?;
    let sentinel = sentinel_role_id(&pool).await?;

    let (_, admission) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    let admission_id = as_uuid(&admission["id"])?;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/approve"),
        Some(&manager_token),
        Some(json!({ "role_id": sentinel })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The guard fires before the status flip; the request is still pending.
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/approve"),
        Some(&manager_token),
        Some(json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn role_changes_reject_sentinel_and_no_op() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (student_id, _) = register(&app, "Rae", "rae@example.com").await?;
    let (manager_id, manager_token) = register(&app, "Mina", "mina@example.com").await?;
    add_member(&pool, manager_id, lab_id, "Lab Manager").await?;
    let member_id = add_member(&pool, student_id, lab_id, "Student").await?;

    let student_role = lab_role_id(&pool, "Student").await?;
    let researcher_role = lab_role_id(&pool, "Researcher").await?;
    let sentinel = sentinel_role_id(&pool).await?;

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/members/{member_id}/role"),
        Some(&manager_token),
        Some(json!({ "role_id": sentinel })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/members/{member_id}/role"),
        Some(&manager_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, changed) = call(
        &app,
        "PUT",
        &format!("/api/members/{member_id}/role"),
        Some(&manager_token),
        Some(json!({ "role_id": researcher_role })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{changed}");
    assert_eq!(as_uuid(&changed["lab_role_id"])?, researcher_role);

    Ok(())
}

#[tokio::test]
async fn acting_on_an_unknown_admission_is_not_found() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    create_lab(&pool, "Optics Lab").await?;
    let (_, token) = register(&app, "Rae", "rae@example.com").await?;

    let missing = Uuid::new_v4();
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/admissions/{missing}/withdraw"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

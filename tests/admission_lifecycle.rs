mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{add_member, as_uuid, call, create_lab, lab_role_id, register, setup};

#[tokio::test]
async fn request_then_approve_materializes_membership() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (requester_id, requester_token) = register(&app, "Rae", "rae@example.com").await?;
    let (manager_id, manager_token) = register(&app, "Mina", "mina@example.com").await?;
    add_member(&pool, manager_id, lab_id, "Lab Manager").await?;

    let student_role = lab_role_id(&pool, "Student").await?;

    let (status, admission) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{admission}");
    assert_eq!(admission["status"], "PENDING");
    assert_eq!(as_uuid(&admission["user_id"])?, requester_id);
    let admission_id = as_uuid(&admission["id"])?;

    // Pending request is visible to the manager, with embedded summaries.
    let (status, listed) = call(
        &app,
        "GET",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&manager_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let rows = listed.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "PENDING");
    assert_eq!(rows[0]["user"]["display_name"], "Rae Tester");
    assert_eq!(rows[0]["role"]["name"], "Student");

    let (status, approval) = call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/approve"),
        Some(&manager_token),
        Some(json!({ "is_pci": true })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{approval}");
    assert_eq!(approval["admission"]["status"], "APPROVED");
    assert_eq!(as_uuid(&approval["admission"]["decided_by"])?, manager_id);

    let member = &approval["member"];
    assert_eq!(as_uuid(&member["user_id"])?, requester_id);
    assert_eq!(as_uuid(&member["lab_role_id"])?, student_role);
    assert_eq!(member["is_pci"], true);
    // Induction is a separate step; approval never sets it.
    assert_eq!(member["induction_done"], false);

    let (status, members) = call(
        &app,
        "GET",
        &format!("/api/labs/{lab_id}/members"),
        Some(&requester_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = members
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["display_name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Rae Tester"), "members: {members}");

    Ok(())
}

#[tokio::test]
async fn approve_honors_role_override() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (_, requester_token) = register(&app, "Rae", "rae@example.com").await?;
    let (manager_id, manager_token) = register(&app, "Mina", "mina@example.com").await?;
    add_member(&pool, manager_id, lab_id, "Lab Manager").await?;

    let student_role = lab_role_id(&pool, "Student").await?;
    let researcher_role = lab_role_id(&pool, "Researcher").await?;

    let (_, admission) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    let admission_id = as_uuid(&admission["id"])?;

    let (status, approval) = call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/approve"),
        Some(&manager_token),
        Some(json!({ "role_id": researcher_role })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{approval}");
    assert_eq!(as_uuid(&approval["member"]["lab_role_id"])?, researcher_role);
    assert_eq!(as_uuid(&approval["admission"]["role_id"])?, researcher_role);
    assert_eq!(approval["member"]["is_pci"], false);

    Ok(())
}

#[tokio::test]
async fn approving_twice_is_a_conflict() -> Result<()> {
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

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/approve"),
        Some(&manager_token),
        Some(json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/approve"),
        Some(&manager_token),
        Some(json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");

    Ok(())
}

#[tokio::test]
async fn active_member_cannot_request_again() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let lab_id = create_lab(&pool, "Optics Lab").await?;
    let (requester_id, requester_token) = register(&app, "Rae", "rae@example.com").await?;
    add_member(&pool, requester_id, lab_id, "Student").await?;

    let student_role = lab_role_id(&pool, "Student").await?;
    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/labs/{lab_id}/admissions"),
        Some(&requester_token),
        Some(json!({ "role_id": student_role })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["error"], "conflict");

    Ok(())
}

#[tokio::test]
async fn my_admissions_lists_history() -> Result<()> {
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

    call(
        &app,
        "POST",
        &format!("/api/admissions/{admission_id}/reject"),
        Some(&manager_token),
        None,
    )
    .await?;

    let (status, mine) = call(&app, "GET", "/api/admissions/mine", Some(&requester_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let rows = mine.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "REJECTED");
    assert_eq!(rows[0]["lab"]["name"], "Optics Lab");

    // The manager's own history is empty; /mine never leaks other users.
    let (_, theirs) = call(&app, "GET", "/api/admissions/mine", Some(&manager_token), None).await?;
    assert!(theirs.as_array().unwrap().is_empty());

    Ok(())
}

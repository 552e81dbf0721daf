use serde::Serialize;
use serde_json::Value;

use domain::PendingSyncReply;

const BASE_URL: &str = "http://127.0.0.1:3000";
const SUBMISSION: &str = "t3_demo";

#[derive(Serialize)]
struct SubmitReplyRequest {
    parent_submission_id: String,
    parent_contribution_id: String,
    body: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    println!("Starting replybox test client...");

    println!("\n[1/4] Saving a draft...");
    let draft_url = format!("{}/api/drafts/{}", BASE_URL, SUBMISSION);
    client
        .put(&draft_url)
        .json(&serde_json::json!({ "body": "half-typed reply" }))
        .send()
        .await?
        .error_for_status()?;
    let draft: Value = client.get(&draft_url).send().await?.json().await?;
    println!("   -> Draft: {}", draft["body"]);

    println!("\n[2/4] Submitting reply...");
    let payload = SubmitReplyRequest {
        parent_submission_id: SUBMISSION.to_string(),
        parent_contribution_id: SUBMISSION.to_string(),
        body: "This is a message from the replybox test client!".to_string(),
    };
    let resp = client
        .post(format!("{}/api/replies", BASE_URL))
        .json(&payload)
        .send()
        .await?;

    if resp.status().is_success() {
        let reply: PendingSyncReply = resp.json().await?;
        println!("   -> ✅ Posted as {:?}", reply.posted_id);
    } else {
        println!("   -> ❌ Failed to send: {:?}", resp.text().await?);
    }

    println!("\n[3/4] Pending replies for {}:", SUBMISSION);
    let list_url = format!("{}/api/submissions/{}/replies", BASE_URL, SUBMISSION);
    let pending: Vec<PendingSyncReply> = client.get(&list_url).send().await?.json().await?;
    for r in &pending {
        println!("      - [{}] {} ({})", r.created_at_millis, r.body, r.state);
    }

    println!("\n[4/4] Failed replies:");
    let failed_url = format!("{}/api/replies/failed", BASE_URL);
    let failed: Vec<PendingSyncReply> = client.get(&failed_url).send().await?.json().await?;
    for r in &failed {
        println!(
            "      - [{}] {} -> {}",
            r.created_at_millis, r.body, r.parent_contribution_id
        );
    }

    Ok(())
}

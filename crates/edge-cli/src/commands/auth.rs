//! Session commands - login, verify, logout, organization switch

use anyhow::{bail, Context, Result};
use edge_client::{EdgeClient, LoginOutcome};

use crate::output::OutputContext;

/// Log in, completing an MFA challenge when a code is supplied
pub async fn login(
    client: &EdgeClient,
    username: &str,
    password: &str,
    mfa_code: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let outcome = client
        .authenticate_user(username, password)
        .await
        .context("Login failed")?;

    if outcome == LoginOutcome::MfaRequired {
        let Some(code) = mfa_code else {
            ctx.warn("MFA challenge issued: re-run with --mfa-code <CODE>");
            bail!("MFA code required");
        };
        client
            .submit_mfa(code)
            .await
            .context("MFA verification failed")?;
    }

    let session = client.session_id().context("No session was issued")?;
    ctx.success(&format!("Logged in as {}", username));
    ctx.print_kv(&[
        ("session", session.clone()),
        (
            "expires",
            client
                .session_expires_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        ),
    ]);
    ctx.info(&format!("\nexport EDGE_SESSION={}", session));
    Ok(())
}

/// Check the session against the backend
pub async fn verify(client: &EdgeClient, ctx: &OutputContext) -> Result<()> {
    let state = client
        .verify_auth_state()
        .await
        .context("Failed to verify session")?;
    ctx.print_kv(&[("state", state.to_string())]);
    Ok(())
}

/// End the session
pub async fn logout(client: &EdgeClient, ctx: &OutputContext) -> Result<()> {
    client.close_session().await.context("Logout failed")?;
    ctx.success("Session closed");
    Ok(())
}

/// Switch the session to another organization
pub async fn switch_org(client: &EdgeClient, org_id: &str, ctx: &OutputContext) -> Result<()> {
    client
        .switch_organization(org_id)
        .await
        .with_context(|| format!("Failed to switch to organization {}", org_id))?;
    ctx.success(&format!("Switched to organization {}", org_id));
    Ok(())
}

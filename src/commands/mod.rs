pub(crate) mod database;
pub(crate) mod request;
pub(crate) mod service;
pub(crate) mod user;

use dbagent::{GuestAgent, Request, Response};

/// Run one request and print its JSON response on stdout.
pub(crate) async fn execute(agent: &GuestAgent, request: Request) -> anyhow::Result<Response> {
    let response = agent.handle_request(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response)
}

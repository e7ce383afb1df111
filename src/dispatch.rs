//! Routes a resolved command to the flow that handles it.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::{AgentCommand, CommandRequest};
use crate::discovery::discuss_templates;
use crate::engine::{ChatResponse, Services};
use crate::fulfillment::discuss_fulfillment;
use crate::session::SessionState;

pub async fn dispatch(
    services: &Services,
    session: &mut SessionState,
    request: &CommandRequest,
    token: &CancellationToken,
) -> ChatResponse {
    match request.command {
        AgentCommand::FindTemplate => discuss_templates(services, &request.argument, token).await,
        AgentCommand::Fulfill => {
            discuss_fulfillment(services, session, &request.argument, token).await
        }
        AgentCommand::Cancel => {
            info!(previous = %session.command_in_progress, "command_cancelled");
            session.reset();
            let mut response = ChatResponse::default();
            response.report(
                "Right-o! We can pretend that never happened. What do you want to talk about now?",
            );
            response
        }
        other => {
            warn!(command = %other, "command_not_handled");
            ChatResponse::failed(format!(
                "I'm sorry, I don't know how to handle the command: {}",
                other
            ))
        }
    }
}

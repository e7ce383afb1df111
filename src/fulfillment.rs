//! The fulfillment dialogue: collect one value per template input, then
//! confirm and submit.

use rand::seq::IndexedRandom;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::AgentCommand;
use crate::discovery::find_one_template;
use crate::engine::{ChatResponse, Services};
use crate::fields::{FieldType, InputField, parse_input_fields};
use crate::session::{FulfillmentState, SessionState};
use crate::submission::{SubmitOutcome, submit_fulfillment};
use crate::template::Template;
use crate::validators::{coerce_field_value, is_affirmative};

const PREVIOUS_TOKENS: &[&str] = &["/previous", "/prev", "/back"];
const SKIP_TOKENS: &[&str] = &["/skip", "/next", "/forward"];

/// Reply offered after any failure that resets the session.
pub const HELP_FOLLOW_UP: &str = "/help";

/// Report a failure, drop the dialogue and point the user at `/help`.
pub fn report_problem(
    session: &mut SessionState,
    response: &mut ChatResponse,
    problem: &dyn std::fmt::Display,
) {
    warn!(error = %problem, "fulfillment_failed");
    response.report(format!("Oh man, I hit a problem!! {}", problem));
    response.follow_up(HELP_FOLLOW_UP);
    session.reset();
}

/// Handle `/fulfill`, both the first turn and every continuation.
pub async fn discuss_fulfillment(
    services: &Services,
    session: &mut SessionState,
    argument: &str,
    token: &CancellationToken,
) -> ChatResponse {
    if session.command_in_progress == AgentCommand::Fulfill && session.fulfillment.is_some() {
        return continue_dialogue(services, session, argument).await;
    }
    start_dialogue(services, session, argument, token).await
}

async fn start_dialogue(
    services: &Services,
    session: &mut SessionState,
    argument: &str,
    token: &CancellationToken,
) -> ChatResponse {
    let mut response = ChatResponse::default();
    let title = argument.trim();
    if title.is_empty() {
        response.report(
            "I'm sorry, I need to know which template to use. Try `/fulfill` followed by the title of a template.",
        );
        session.reset();
        return response;
    }

    let Some(template) = find_one_template(services, title, token).await else {
        response.report(format!(
            "I'm sorry, I couldn't find a template with the title: `{}`",
            title
        ));
        session.reset();
        return response;
    };

    response.report(format!(
        "Sounds like you'd like to submit fulfillment request for **{}**. ",
        template.title()
    ));
    let input_fields = match input_fields_for(&template) {
        Ok(fields) => fields,
        Err(e) => {
            report_problem(session, &mut response, &e);
            return response;
        }
    };
    if !input_fields.is_empty() {
        response.report("I can do that.\n");
        response.report("\nLet's get started!\n\n");
    }
    info!(
        title = %template.title(),
        fields = input_fields.len(),
        "fulfillment_started"
    );

    let mut state = FulfillmentState::new(template, input_fields);
    advance(&mut state, &mut response);
    session.command_in_progress = AgentCommand::Fulfill;
    session.fulfillment = Some(state);
    response
}

fn input_fields_for(template: &Template) -> Result<Vec<InputField>, serde_json::Error> {
    Ok(template
        .input_schema()?
        .map(|schema| parse_input_fields(&schema))
        .unwrap_or_default())
}

async fn continue_dialogue(
    services: &Services,
    session: &mut SessionState,
    argument: &str,
) -> ChatResponse {
    let mut response = ChatResponse::default();
    let Some(state) = session.fulfillment.as_mut() else {
        session.reset();
        return response;
    };

    if state.confirmation_pending {
        return confirm(services, session, argument).await;
    }

    let navigation = argument.trim().to_lowercase();
    if PREVIOUS_TOKENS.contains(&navigation.as_str()) {
        if state.is_first_field() {
            response.report("I'm sorry, we're already at the first input.\n\n");
        } else {
            response.report("Ok, let's go back to the previous input.\n\n");
            state.step_back();
        }
        prompt_current_field(state, &mut response);
        return response;
    }

    if SKIP_TOKENS.contains(&navigation.as_str()) {
        skip(state, &mut response);
        return response;
    }

    if let Some(field) = state.current_field() {
        match coerce_field_value(field, argument) {
            Ok(value) => {
                let name = field.name.clone();
                state.collected_values.insert(name, value);
            }
            Err(e) => {
                info!(field = %field.name, "invalid_input_retry");
                response.report(e.to_string());
                prompt_current_field(state, &mut response);
                return response;
            }
        }
    }

    advance(state, &mut response);
    response
}

fn skip(state: &mut FulfillmentState, response: &mut ChatResponse) {
    let Some(field) = state.current_field() else {
        return;
    };
    let title = field.display_title().to_string();
    if field.required {
        response.report(format!(
            "I'm sorry, **{}** is a required input. You can't skip it.\n\n",
            title
        ));
        prompt_current_field(state, response);
        return;
    }
    response.report(format!("Ok, skipping the **{}** input.\n\n", title));
    let name = field.name.clone();
    state.collected_values.remove(&name);
    // Skipping the last optional input goes straight to confirmation.
    advance(state, response);
}

/// Move past the current field and ask for the next one, or for confirmation.
fn advance(state: &mut FulfillmentState, response: &mut ChatResponse) {
    if !state.advance() {
        prompt_current_field(state, response);
        return;
    }

    response.report("I have all the information I need to submit a fulfillment request.\n");
    for (title, value) in state.summary_lines() {
        response.report(format!("1. **{}**: {}\n", title, value));
    }
    response.report("\n**Do you want me to submit the fulfillment request now?**");
    response.follow_up("Yes");
    response.follow_up("No");
    state.confirmation_pending = true;
}

fn prompt_current_field(state: &FulfillmentState, response: &mut ChatResponse) {
    let Some(field) = state.current_field() else {
        return;
    };
    response.report(format!(
        "What do you want me to use as the **{}**?\n\nReply with {}",
        field.display_title(),
        field.reply_hint()
    ));

    match (&field.field_type, &field.default, &field.enum_values) {
        (FieldType::Boolean, _, _) => {
            response.follow_up("true");
            response.follow_up("false");
        }
        (_, Some(default), _) => response.follow_up(default.clone()),
        (FieldType::String, None, Some(values)) => {
            let offered: Vec<&String> = values.iter().filter(|v| !v.is_empty()).collect();
            if let Some(value) = offered.choose(&mut rand::rng()) {
                response.follow_up((*value).clone());
            }
        }
        _ => {}
    }
    if !state.is_first_field() {
        response.follow_up("/previous");
    }
    if !field.required && !state.is_last_field() {
        response.follow_up("/skip");
    }
    response.follow_up(AgentCommand::Cancel.to_string());
}

async fn confirm(services: &Services, session: &mut SessionState, argument: &str) -> ChatResponse {
    let mut response = ChatResponse::default();
    let Some(state) = session.fulfillment.take() else {
        session.reset();
        return response;
    };
    session.reset();

    let title = state.template.title().to_string();
    if !is_affirmative(argument) {
        info!(title = %title, "fulfillment_declined");
        response.report(format!(
            "Ok, I **won't** create a request to fulfill **{}**. Aborting!",
            title
        ));
        response.follow_up(format!("{} {}", AgentCommand::Fulfill, title));
        return response;
    }

    response.report("Ok! Submitting fulfillment request **now**.\n");
    match submit_fulfillment(
        services.api.clone(),
        services.notifier.clone(),
        &state,
        services.settings.polling,
        &services.settings.repo_url_base,
    )
    .await
    {
        Ok(outcome) => {
            response.report(outcome.message());
            // The poll owns its notification; the turn does not wait on it.
            if let SubmitOutcome::Accepted { request_id, poll } = outcome {
                debug!(
                    request_id = %request_id,
                    finished = poll.is_finished(),
                    "status_poll_detached"
                );
            }
        }
        Err(e) => report_problem(session, &mut response, &e),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResult;
    use crate::fields::FieldValue;
    use crate::template::sample_template;
    use crate::test_support::{ScriptedAgent, TestHandles, services_with};
    use serde_json::json;

    fn template() -> Template {
        sample_template(
            "service",
            "Service",
            Some(json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "title": "Name" },
                    "private": { "type": "boolean", "title": "Private" },
                    "replicas": { "type": "integer", "default": 2 },
                    "tier": { "type": "string", "enum": ["free", "paid"] }
                },
                "required": ["name"]
            })),
        )
    }

    fn setup() -> (Services, TestHandles, SessionState) {
        let (services, handles) = services_with(vec![template()], ScriptedAgent::empty());
        (services, handles, SessionState::default())
    }

    async fn turn(services: &Services, session: &mut SessionState, text: &str) -> ChatResponse {
        discuss_fulfillment(services, session, text, &CancellationToken::new()).await
    }

    fn cursor(session: &SessionState) -> isize {
        session.fulfillment.as_ref().unwrap().cursor
    }

    fn values(session: &SessionState) -> Vec<(String, FieldValue)> {
        session
            .fulfillment
            .as_ref()
            .unwrap()
            .collected_values
            .clone()
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_entry_prompts_first_field() {
        let (services, _, mut session) = setup();
        let response = turn(&services, &mut session, "Service").await;

        assert_eq!(
            response.text(),
            "Sounds like you'd like to submit fulfillment request for **Service**. I can do that.\n\nLet's get started!\n\nWhat do you want me to use as the **Name**?\n\nReply with a string."
        );
        assert_eq!(response.follow_ups, vec!["/cancel".to_string()]);
        assert_eq!(session.command_in_progress, AgentCommand::Fulfill);
        assert_eq!(cursor(&session), 0);
    }

    #[tokio::test]
    async fn test_unknown_template_leaves_no_state() {
        let (services, _, mut session) = setup();
        let response = turn(&services, &mut session, "Mainframe").await;
        assert_eq!(
            response.text(),
            "I'm sorry, I couldn't find a template with the title: `Mainframe`"
        );
        assert_eq!(session.command_in_progress, AgentCommand::FindCommand);
        assert!(session.fulfillment.is_none());
    }

    #[tokio::test]
    async fn test_template_without_inputs_goes_to_confirmation() {
        let (services, _) =
            services_with(vec![sample_template("bare", "Bare", None)], ScriptedAgent::empty());
        let mut session = SessionState::default();
        let response = turn(&services, &mut session, "bare").await;

        assert!(response.text().contains("I have all the information I need"));
        assert_eq!(response.follow_ups, vec!["Yes".to_string(), "No".to_string()]);
        let state = session.fulfillment.as_ref().unwrap();
        assert!(state.confirmation_pending);
        assert_eq!(state.cursor, 0);
    }

    #[tokio::test]
    async fn test_boolean_prompt_and_follow_ups() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        let response = turn(&services, &mut session, "svc").await;

        assert!(response.text().ends_with("Reply with `true` or `false`."));
        assert_eq!(
            response.follow_ups,
            vec!["true", "false", "/previous", "/skip", "/cancel"]
        );
    }

    #[tokio::test]
    async fn test_default_and_enum_follow_ups() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        turn(&services, &mut session, "svc").await;
        let response = turn(&services, &mut session, "yes").await;
        assert_eq!(response.follow_ups, vec!["2", "/previous", "/skip", "/cancel"]);

        let response = turn(&services, &mut session, "3").await;
        assert!(response.text().ends_with("Reply with one of these values: free, paid. "));
        assert_eq!(response.follow_ups.len(), 3);
        assert!(["free", "paid"].contains(&response.follow_ups[0].as_str()));
        // Last field: nothing to skip to.
        assert_eq!(response.follow_ups[1..], ["/previous", "/cancel"]);
    }

    #[tokio::test]
    async fn test_empty_enum_entry_is_an_answer() {
        let suffixed = sample_template(
            "suffixed",
            "Suffixed",
            Some(json!({
                "properties": {
                    "suffix": { "type": "string", "enum": ["", "-dev"] },
                    "name": { "type": "string" }
                },
                "required": ["suffix", "name"]
            })),
        );
        let (services, _) = services_with(vec![suffixed], ScriptedAgent::empty());
        let mut session = SessionState::default();
        let response = turn(&services, &mut session, "Suffixed").await;
        assert_eq!(response.follow_ups, vec!["-dev", "/cancel"]);

        turn(&services, &mut session, "").await;
        assert_eq!(cursor(&session), 1);
        assert_eq!(
            values(&session),
            vec![("suffix".to_string(), FieldValue::String(String::new()))]
        );
    }

    #[tokio::test]
    async fn test_previous_keeps_collected_values() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        turn(&services, &mut session, "svc").await;
        turn(&services, &mut session, "no").await;
        let before = values(&session);

        let response = turn(&services, &mut session, "/BACK").await;
        assert!(response.text().starts_with("Ok, let's go back to the previous input.\n\n"));
        assert!(response.text().contains("**Private**"));
        assert_eq!(cursor(&session), 1);
        assert_eq!(values(&session), before);
    }

    #[tokio::test]
    async fn test_previous_at_first_field() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        let response = turn(&services, &mut session, "/prev").await;
        assert!(response.text().starts_with("I'm sorry, we're already at the first input."));
        assert_eq!(cursor(&session), 0);
    }

    #[tokio::test]
    async fn test_skip_required_field_changes_nothing() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        let response = turn(&services, &mut session, "/skip").await;
        assert!(
            response
                .text()
                .starts_with("I'm sorry, **Name** is a required input. You can't skip it.")
        );
        assert_eq!(cursor(&session), 0);
        assert!(values(&session).is_empty());
    }

    #[tokio::test]
    async fn test_skip_last_optional_field_goes_to_confirmation() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        turn(&services, &mut session, "svc").await;
        turn(&services, &mut session, "/next").await;
        turn(&services, &mut session, "/forward").await;
        assert_eq!(cursor(&session), 3);

        let response = turn(&services, &mut session, "/skip").await;
        assert!(response.text().starts_with(
            "Ok, skipping the **tier** input.\n\nI have all the information I need"
        ));
        assert_eq!(response.follow_ups, vec!["Yes".to_string(), "No".to_string()]);
        let state = session.fulfillment.as_ref().unwrap();
        assert!(state.confirmation_pending);
        assert_eq!(state.cursor, 4);
        assert_eq!(values(&session).len(), 1);
    }

    #[tokio::test]
    async fn test_skip_drops_value_collected_earlier() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        turn(&services, &mut session, "svc").await;
        turn(&services, &mut session, "yes").await;
        turn(&services, &mut session, "/previous").await;

        let response = turn(&services, &mut session, "/skip").await;
        assert!(response.text().starts_with("Ok, skipping the **Private** input."));
        let names: Vec<String> = values(&session).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["name"]);
    }

    #[tokio::test]
    async fn test_invalid_number_reprompts_same_field() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        turn(&services, &mut session, "svc").await;
        turn(&services, &mut session, "y").await;

        let response = turn(&services, &mut session, "a few").await;
        assert!(response.text().starts_with(
            "I'm sorry, I didn't understand \"a few.\" I need a integer value for **replicas**."
        ));
        assert!(response.text().contains("What do you want me to use as the **replicas**?"));
        assert_eq!(cursor(&session), 2);
        assert!(!values(&session).iter().any(|(n, _)| n == "replicas"));
    }

    #[tokio::test]
    async fn test_confirmation_summary_lists_values_in_field_order() {
        let (services, _, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        turn(&services, &mut session, "svc").await;
        turn(&services, &mut session, "/skip").await;
        turn(&services, &mut session, "4").await;
        let response = turn(&services, &mut session, "paid").await;

        assert_eq!(
            response.text(),
            "I have all the information I need to submit a fulfillment request.\n1. **Name**: svc\n1. **replicas**: 4\n1. **tier**: paid\n\n**Do you want me to submit the fulfillment request now?**"
        );
        let state = session.fulfillment.as_ref().unwrap();
        assert!(state.confirmation_pending);
        assert_eq!(state.cursor, 4);
    }

    async fn at_confirmation() -> (Services, TestHandles, SessionState) {
        let (services, handles, mut session) = setup();
        turn(&services, &mut session, "Service").await;
        turn(&services, &mut session, "svc").await;
        turn(&services, &mut session, "/skip").await;
        turn(&services, &mut session, "/skip").await;
        turn(&services, &mut session, "free").await;
        (services, handles, session)
    }

    #[tokio::test]
    async fn test_negative_confirmation_aborts() {
        let (services, handles, mut session) = at_confirmation().await;
        let response = turn(&services, &mut session, "nah").await;

        assert_eq!(
            response.text(),
            "Ok, I **won't** create a request to fulfill **Service**. Aborting!"
        );
        assert_eq!(response.follow_ups, vec!["/fulfill Service".to_string()]);
        assert!(session.fulfillment.is_none());
        assert_eq!(session.command_in_progress, AgentCommand::FindCommand);
        assert_eq!(handles.api.calls_to("entities"), 0);
    }

    #[tokio::test]
    async fn test_affirmative_confirmation_submits_once() {
        let (services, handles, mut session) = at_confirmation().await;
        handles
            .api
            .respond("entities", ApiResult::from_parts(201, None, r#"{"id":"r9"}"#.to_string()));

        let response = turn(&services, &mut session, "Y").await;
        assert_eq!(
            response.text(),
            "Ok! Submitting fulfillment request **now**.\n\nRequest r9 complete!"
        );
        assert_eq!(handles.api.calls_to("entities"), 1);
        assert_eq!(
            handles.api.bodies_sent_to("entities")[0]["inputJson"],
            r#"{"name":"svc","tier":"free"}"#
        );
        assert!(session.fulfillment.is_none());
    }

    #[tokio::test]
    async fn test_rejected_submission_reports_problem() {
        let (services, handles, mut session) = at_confirmation().await;
        handles
            .api
            .respond("entities", ApiResult::from_parts(500, None, "down".to_string()));

        let response = turn(&services, &mut session, "yes").await;
        assert!(response.text().contains("Oh man, I hit a problem!!"));
        assert_eq!(response.follow_ups, vec!["/help".to_string()]);
        assert_eq!(session.command_in_progress, AgentCommand::FindCommand);
    }

    #[tokio::test]
    async fn test_broken_schema_resets_session() {
        let mut broken = sample_template("broken", "Broken", None);
        broken.spec.input_json_schema = Some("{not json".to_string());
        let (services, _) = services_with(vec![broken], ScriptedAgent::empty());
        let mut session = SessionState::default();

        let response = turn(&services, &mut session, "Broken").await;
        assert!(response.text().contains("Oh man, I hit a problem!!"));
        assert_eq!(response.follow_ups, vec!["/help".to_string()]);
        assert!(session.fulfillment.is_none());
        assert_eq!(session.command_in_progress, AgentCommand::FindCommand);
    }
}

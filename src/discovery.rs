//! Finding templates from natural language, combining the catalog index with
//! the agent.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{ChatMessage, ask_for_json};
use crate::command::AgentCommand;
use crate::engine::{ChatResponse, Services};
use crate::prompts::{
    RESOLVE_TEMPLATE_PROMPT_PREFIX, RESOLVE_TEMPLATE_PROMPT_SUFFIX, TEMPLATE_LIST_PROMPT_PREFIX,
    TEMPLATE_LIST_PROMPT_SUFFIX, TEMPLATE_SEARCH_QUERY_PROMPT, with_context,
};
use crate::template::{Template, TemplateSummary};

const TITLE_FIELD: &[&str] = &["title"];

fn search_or_empty(services: &Services, query: &str) -> Vec<Template> {
    services.catalog.search(query).unwrap_or_else(|e| {
        warn!(query, error = %e, "template_search_failed");
        Vec::new()
    })
}

fn search_exact_title(services: &Services, term: &str) -> Vec<Template> {
    services
        .catalog
        .search_exact(term, Some(TITLE_FIELD))
        .unwrap_or_else(|e| {
            warn!(term, error = %e, "template_exact_search_failed");
            Vec::new()
        })
}

/// Rewrite a request into catalog query syntax. Falls back to the request itself.
pub async fn refine_search_query(
    services: &Services,
    query: &str,
    token: &CancellationToken,
) -> String {
    let messages = [
        ChatMessage::system(TEMPLATE_SEARCH_QUERY_PROMPT),
        ChatMessage::user(format!("Refine the following search query: {}", query)),
    ];
    let refined = match ask_for_json(
        services.agent.as_ref(),
        &messages,
        token,
        services.settings.max_json_attempts,
    )
    .await
    {
        Ok(Value::Array(terms)) => terms
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        Ok(_) => String::new(),
        Err(e) => {
            debug!(error = %e, "search_query_refinement_failed");
            String::new()
        }
    };

    if refined.trim().is_empty() {
        info!(query, "search_query_unrefined");
        query.to_string()
    } else {
        info!(query, refined = %refined, "search_query_refined");
        refined
    }
}

/// Let the agent narrow search hits down to the ones matching the request.
///
/// `None` when the agent could not answer; the caller keeps the hits as they are.
async fn filter_with_agent(
    services: &Services,
    query: &str,
    hits: &[Template],
    token: &CancellationToken,
) -> Option<Vec<Template>> {
    let summaries: Vec<TemplateSummary> = hits
        .iter()
        .enumerate()
        .map(|(i, t)| t.summary(Some(i)))
        .collect();
    let summaries_json = serde_json::to_string(&summaries).ok()?;
    let messages = [
        ChatMessage::system(with_context(
            TEMPLATE_LIST_PROMPT_PREFIX,
            &summaries_json,
            TEMPLATE_LIST_PROMPT_SUFFIX,
        )),
        ChatMessage::user(format!(
            "What templates can I use that best match the following criteria? {}",
            query
        )),
    ];
    let response = ask_for_json(
        services.agent.as_ref(),
        &messages,
        token,
        services.settings.max_json_attempts,
    )
    .await
    .map_err(|e| debug!(error = %e, "template_filter_failed"))
    .ok()?;

    let Value::Array(selected) = response else {
        return None;
    };
    let mut filtered: Vec<Template> = Vec::new();
    for item in &selected {
        let index = match item.get("resultIndex") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let claimed_ref = item
            .get("ref")
            .or_else(|| item.get("templateRef"))
            .and_then(Value::as_str);
        let Some(hit) = index.and_then(|i| hits.get(i as usize)) else {
            debug!(item = %item, "template_filter_index_out_of_range");
            continue;
        };
        if claimed_ref != Some(hit.template_ref().as_str()) {
            debug!(
                expected = %hit.template_ref(),
                claimed = ?claimed_ref,
                "template_filter_ref_mismatch"
            );
            continue;
        }
        if !filtered.iter().any(|t| t.template_ref() == hit.template_ref()) {
            filtered.push(hit.clone());
        }
    }
    Some(filtered)
}

/// Ask the agent to pick one template from the full ref to title map.
pub async fn pick_template_with_agent(
    services: &Services,
    query: &str,
    token: &CancellationToken,
) -> Option<Template> {
    if services.catalog.is_empty() {
        return None;
    }
    let map_json = serde_json::to_string(&services.catalog.ref_to_title_map()).ok()?;
    let messages = [
        ChatMessage::system(with_context(
            RESOLVE_TEMPLATE_PROMPT_PREFIX,
            &map_json,
            RESOLVE_TEMPLATE_PROMPT_SUFFIX,
        )),
        ChatMessage::user(format!(
            "What template best matches the following title? {}",
            query
        )),
    ];
    let response = ask_for_json(
        services.agent.as_ref(),
        &messages,
        token,
        services.settings.max_json_attempts,
    )
    .await
    .map_err(|e| debug!(error = %e, "template_pick_failed"))
    .ok()?;

    let template_ref = response.as_object()?.keys().next()?.clone();
    let template = services.catalog.lookup_by_ref(&template_ref).cloned();
    match &template {
        Some(t) => info!(title = %t.title(), "template_found_by_agent"),
        None => debug!(template_ref = %template_ref, "agent_picked_unknown_template"),
    }
    template
}

/// Templates matching a natural language request, best first.
pub async fn find_template_list(
    services: &Services,
    query: &str,
    token: &CancellationToken,
) -> Vec<Template> {
    let refined = refine_search_query(services, query, token).await;
    let hits = search_or_empty(services, &refined);
    info!(count = hits.len(), "templates_found");

    if !hits.is_empty() {
        let filtered = filter_with_agent(services, query, &hits, token)
            .await
            .unwrap_or_else(|| hits.clone());
        if !filtered.is_empty() {
            return filtered;
        }
    }

    let exact = search_exact_title(services, query);
    if !exact.is_empty() {
        info!(count = exact.len(), "templates_found_by_exact_title");
        return exact;
    }

    pick_template_with_agent(services, query, token)
        .await
        .into_iter()
        .collect()
}

/// Resolve a request that should name exactly one template.
pub async fn find_one_template(
    services: &Services,
    query: &str,
    token: &CancellationToken,
) -> Option<Template> {
    if let Some(template) = services.catalog.lookup_by_title(query) {
        info!(title = %template.title(), "template_found_by_title");
        return Some(template.clone());
    }
    debug!(query, "title_lookup_missed");

    let by_title = search_or_empty(services, &format!("title:{}", query));
    if let [template] = by_title.as_slice() {
        info!(title = %template.title(), "template_found_by_title_query");
        return Some(template.clone());
    }

    let refined = refine_search_query(services, query, token).await;
    let by_refined = search_or_empty(services, &format!("title:{}", refined));
    if let [template] = by_refined.as_slice() {
        info!(title = %template.title(), "template_found_by_refined_title_query");
        return Some(template.clone());
    }
    debug!(
        title_hits = by_title.len(),
        refined_hits = by_refined.len(),
        "title_search_inconclusive"
    );

    pick_template_with_agent(services, query, token).await
}

/// Handle `/template <query>`.
pub async fn discuss_templates(
    services: &Services,
    argument: &str,
    token: &CancellationToken,
) -> ChatResponse {
    let mut response = ChatResponse::default();
    let query = argument.trim();
    if query.is_empty() {
        response.report(
            "I'm sorry, I need some more information to search for templates. Try `/template` followed by what you want to look for.",
        );
        return response;
    }

    let templates = find_template_list(services, query, token).await;
    let Some(first) = templates.first() else {
        response.report(format!(
            "I'm sorry, I tried to search for templates using the following query but couldn't find anything: `{}`",
            query
        ));
        return response;
    };

    let mut markdown = String::from("Sure! Here is what I found:\n");
    for template in &templates {
        markdown.push_str(&template.markdown_bullet());
    }
    markdown.push_str("\nTo submit a request to the platform, use `/fulfill <title>`.");
    response.report(markdown);
    response.follow_up(format!("{} {}", AgentCommand::Fulfill, first.title()));
    response
}

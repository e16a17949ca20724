pub mod envelope;
pub mod merged;
pub mod model_map;
pub mod orphans;
pub mod parse;
pub mod partition;
pub mod retry;
pub mod system_placement;
pub mod tools;

pub use envelope::Envelope;
pub use retry::inject_tools_from_history;

use kiro_claude::request::MessageRequest;
use kiro_core::error::GatewayError;
use kiro_core::types::Account;

/// Convert a Claude `MessageRequest` into the upstream `conversationState`
/// envelope (spec steps 1 through 6 — step 7, the 400-retry tools
/// injection, runs separately from the caller that sees the upstream error).
pub fn translate(request: &MessageRequest, account: &Account) -> Result<Envelope, GatewayError> {
    if request.messages.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    let model_id = model_map::map_model(&request.model);

    let mut merged = parse::parse_and_merge(&request.messages);

    let system_text = request.system.as_ref().map(|s| s.as_text());
    system_placement::place_system(system_text, &mut merged);

    let required_params = tools::required_params_map(&request.tools);
    orphans::filter_orphans(&mut merged, &required_params);

    let (history, current) = partition::partition(merged);

    let upstream_tools: Vec<tools::UpstreamTool> = request
        .tools
        .iter()
        .filter_map(tools::convert_tool)
        .collect();

    Ok(envelope::build_envelope(
        account,
        model_id,
        &history,
        &current,
        upstream_tools,
    ))
}

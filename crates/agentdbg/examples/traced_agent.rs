//! Trace a small agent loop and print where the run landed.
//!
//! Run with: cargo run --example traced_agent

use agentdbg::prelude::*;
use agentdbg::RunStore;
use serde_json::json;

fn main() {
    let run = traced_run(Some("demo-agent"));
    let run_id = run.run_id();

    record_llm_call(
        LlmCall::new("gpt-4-turbo", "Which tool should I use?", "search, then summarize")
            .with_usage(42, 17)
            .with_stop_reason("end_turn"),
    );

    for page in 1..=3 {
        record_tool_call(
            ToolCall::new("search", json!({"query": "rust tracing", "page": page}))
                .with_result(json!({"hits": 10 * page})),
        );
    }

    record_state(StateSnapshot::new(json!({"step": "summarize", "pages_seen": 3})));
    run.success();

    let config = Config::load();
    if let Some(run_id) = run_id {
        let store = RunStore::new(&config.data_dir);
        match store.load_events(&run_id) {
            Ok(events) => {
                println!("run {} wrote {} events under {}", run_id, events.len(), config.data_dir.display());
            }
            Err(e) => eprintln!("failed to read run back: {e}"),
        }
    }
}

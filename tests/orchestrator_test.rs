//! Orchestrator 集成测试：脚本化适配器 + 记录调用的工具层，逐条验证单轮行为

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use sam_agent::core::error::{ADAPTER_FAILURE_REPLY, BUDGET_EXHAUSTED_REPLY, CONTEXT_CLEARED_REPLY};
    use sam_agent::core::{Orchestrator, OrchestratorSettings, TurnOutcome};
    use sam_agent::events::{AgentEvent, AgentState};
    use sam_agent::fallback::{FallbackPolicy, WSOL_MINT};
    use sam_agent::guard::GuardConfig;
    use sam_agent::llm::{LlmError, ModelReply, ScriptedAdapter};
    use sam_agent::memory::{InMemorySessionStore, Message, Role, ToolCallRequest};
    use sam_agent::tools::{ToolCallResult, ToolExecutor, ToolInvoker, ToolSpec};
    use serde_json::{json, Map, Value};
    use tokio_util::sync::CancellationToken;

    type Responder = Box<dyn Fn(&str, &Map<String, Value>) -> ToolCallResult + Send + Sync>;

    /// 记录每次调用的工具层
    struct RecordingInvoker {
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
        respond: Responder,
    }

    impl RecordingInvoker {
        fn new(respond: impl Fn(&str, &Map<String, Value>) -> ToolCallResult + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn succeeding() -> Arc<Self> {
            Self::new(|name, _| ToolCallResult::ok(json!({"tool": name, "ok": true})))
        }

        fn calls(&self) -> Vec<(String, Map<String, Value>)> {
            self.calls.lock().unwrap().clone()
        }

        fn call_count(&self, name: &str) -> usize {
            self.calls().iter().filter(|(n, _)| n == name).count()
        }
    }

    #[async_trait]
    impl ToolInvoker for RecordingInvoker {
        async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> ToolCallResult {
            let result = (self.respond)(name, &arguments);
            self.calls.lock().unwrap().push((name.to_string(), arguments));
            result
        }

        fn catalog(&self) -> Vec<ToolSpec> {
            ["get_balance", "search_web", "pump_fun_buy", "jupiter_swap"]
                .iter()
                .map(|n| ToolSpec::new(*n, format!("{n} tool"), json!({"type": "object", "properties": {}})))
                .collect()
        }
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn call(id: &str, name: &str, a: Value) -> ToolCallRequest {
        ToolCallRequest::new(id, name, args(a))
    }

    fn tools_reply(calls: Vec<ToolCallRequest>) -> Result<ModelReply, LlmError> {
        Ok(ModelReply::with_tool_calls("", calls))
    }

    fn build(
        adapter: Arc<ScriptedAdapter>,
        invoker: Arc<RecordingInvoker>,
        store: Arc<InMemorySessionStore>,
    ) -> Orchestrator {
        Orchestrator::new(adapter, ToolExecutor::new(invoker, 5), store, "You are SAM.")
            .with_settings(OrchestratorSettings::default().with_guard(GuardConfig::default()))
    }

    fn tool_messages(conv: &[Message]) -> Vec<&Message> {
        conv.iter().filter(|m| m.role == Role::Tool).collect()
    }

    #[tokio::test]
    async fn test_identical_call_is_suppressed_not_dispatched() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![
                call("c1", "search_web", json!({"query": "bonk"})),
                call("c2", "search_web", json!({"query": "bonk"})),
            ]),
            tools_reply(vec![call("c3", "search_web", json!({"query": "bonk"}))]),
            Ok(ModelReply::text("BONK is up.")),
        ]));
        let invoker = RecordingInvoker::succeeding();
        let store = Arc::new(InMemorySessionStore::new());
        let orch = build(adapter.clone(), invoker.clone(), store);

        assert_eq!(orch.run("s1", "news on bonk").await, "BONK is up.");
        assert_eq!(invoker.call_count("search_web"), 1);

        let last = adapter.conversations().pop().unwrap();
        let tools = tool_messages(&last);
        assert_eq!(tools.len(), 3);
        assert!(tools[1].content.contains("DUPLICATE_TOOL_CALL"));
        assert!(tools[2].content.contains("DUPLICATE_TOOL_CALL"));
    }

    #[tokio::test]
    async fn test_tool_results_follow_request_order() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![
                call("a", "get_balance", json!({})),
                call("b", "search_web", json!({"query": "sol"})),
                call("c", "get_token_data", json!({"address": "BONK"})),
            ]),
            Ok(ModelReply::text("done")),
        ]));
        let invoker = RecordingInvoker::succeeding();
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "overview").await;

        let second = &adapter.conversations()[1];
        let assistant_at = second
            .iter()
            .position(|m| m.has_tool_calls())
            .unwrap();
        let ids: Vec<_> = second[assistant_at + 1..assistant_at + 4]
            .iter()
            .map(|m| (m.role, m.tool_call_id.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            ids,
            vec![
                (Role::Tool, "a".to_string()),
                (Role::Tool, "b".to_string()),
                (Role::Tool, "c".to_string()),
            ]
        );
        let names: Vec<_> = invoker.calls().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["get_balance", "search_web", "get_token_data"]);
        assert_eq!(
            orch.cached_token_metadata("BONK").await,
            Some(json!({"tool": "get_token_data", "ok": true}))
        );
    }

    #[tokio::test]
    async fn test_three_failures_inject_guidance_before_next_dispatch() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![
                call("f1", "get_balance", json!({})),
                call("f2", "search_web", json!({"query": "x"})),
                call("f3", "get_token_info", json!({"mint": "Y"})),
            ]),
            Ok(ModelReply::text("Sorry, tools are failing.")),
        ]));
        let invoker = RecordingInvoker::new(|_, _| ToolCallResult::failure("upstream exploded", None));
        let orch = build(adapter.clone(), invoker, Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "do things").await;

        let second = &adapter.conversations()[1];
        let last_tool = second.iter().rposition(|m| m.role == Role::Tool).unwrap();
        let guidance: Vec<_> = second[last_tool + 1..]
            .iter()
            .filter(|m| m.role == Role::System)
            .collect();
        // 每次失败一条提示 + 达到上限时一条汇总提示
        assert_eq!(guidance.len(), 4);
        assert!(guidance[3].content.starts_with("MULTIPLE ERRORS"));
        assert!(guidance[3].content.contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_no_remediation_after_cutoff() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![
                call("f1", "get_balance", json!({})),
                call("f2", "search_web", json!({"query": "x"})),
                call("f3", "get_token_info", json!({"mint": "Y"})),
            ]),
            tools_reply(vec![call("f4", "pump_fun_buy", json!({"mint": "X", "amount": 0.1}))]),
            Ok(ModelReply::text("giving up")),
        ]));
        let invoker = RecordingInvoker::new(|_, _| ToolCallResult::failure("service unavailable", None));
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "buy X").await;

        // 截断后不再替代调用，也不再追加提示
        assert_eq!(invoker.call_count("jupiter_swap"), 0);
        let third = &adapter.conversations()[2];
        assert_eq!(third.last().unwrap().role, Role::Tool);
        assert_eq!(third.last().unwrap().tool_call_id.as_deref(), Some("f4"));
    }

    #[tokio::test]
    async fn test_budget_exhausted_after_exactly_max_iterations() {
        let adapter = Arc::new(ScriptedAdapter::from_fn(|n, _| {
            tools_reply(vec![call(&format!("c{n}"), "search_web", json!({"query": format!("q{n}")}))])
        }));
        let invoker = RecordingInvoker::succeeding();
        let store = Arc::new(InMemorySessionStore::new());
        let orch = build(adapter.clone(), invoker.clone(), store.clone());

        let report = orch.run_turn("s1", "loop forever", &CancellationToken::new()).await;
        assert_eq!(report.reply, BUDGET_EXHAUSTED_REPLY);
        assert_eq!(report.outcome, TurnOutcome::BudgetExhausted);
        assert_eq!(report.iterations, 5);
        assert_eq!(adapter.call_count(), 5);
        assert_eq!(invoker.call_count("search_web"), 5);
        assert!(store.snapshot("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_buy_is_substituted_with_swap() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![call(
                "buy1",
                "pump_fun_buy",
                json!({"mint": "X", "amount": 0.2, "slippage": 5}),
            )]),
            Ok(ModelReply::text("Bought via Jupiter.")),
        ]));
        let invoker = RecordingInvoker::new(|name, _| match name {
            "pump_fun_buy" => ToolCallResult::failure("bonding curve complete", None),
            _ => ToolCallResult::ok(json!({"signature": "sig123"})),
        });
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new())).with_event_tx(tx);
        assert_eq!(orch.run("s1", "buy 0.2 SOL of X").await, "Bought via Jupiter.");

        let calls = invoker.calls();
        assert_eq!(calls.len(), 2);
        let (name, swap_args) = &calls[1];
        assert_eq!(name, "jupiter_swap");
        assert_eq!(swap_args["amount"], json!(200_000_000u64));
        assert_eq!(swap_args["slippage_bps"], json!(500u64));
        assert_eq!(swap_args["input_mint"], WSOL_MINT);
        assert_eq!(swap_args["output_mint"], "X");

        let second = &adapter.conversations()[1];
        let tools = tool_messages(second);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].tool_call_id.as_deref(), Some("buy1"));
        assert_eq!(tools[0].tool_name.as_deref(), Some("jupiter_swap"));
        let content: Value = serde_json::from_str(&tools[0].content).unwrap();
        assert_eq!(content["substituted_call"]["tool"], "jupiter_swap");
        assert_eq!(content["result"]["signature"], "sig123");
        // 替代成功：不追加失败提示
        assert!(!second.iter().skip(2).any(|m| m.role == Role::System));

        let mut saw_fallback = false;
        let mut fallback_call_id = None;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                AgentEvent::Status { state: AgentState::Fallback, .. } => saw_fallback = true,
                AgentEvent::ToolCalled { tool_call_id, name, .. } if name == "jupiter_swap" => {
                    fallback_call_id = Some(tool_call_id)
                }
                _ => {}
            }
        }
        assert!(saw_fallback);
        assert_eq!(fallback_call_id.as_deref(), Some("fallback-buy1"));
    }

    #[tokio::test]
    async fn test_substituted_swap_counts_toward_duplicate_check() {
        let swap_args = json!({
            "input_mint": WSOL_MINT,
            "output_mint": "X",
            "amount": 200_000_000u64,
            "slippage_bps": 500u64,
        });
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![call(
                "buy1",
                "pump_fun_buy",
                json!({"mint": "X", "amount": 0.2, "slippage": 5}),
            )]),
            tools_reply(vec![call("swap1", "jupiter_swap", swap_args)]),
            Ok(ModelReply::text("Bought.")),
        ]));
        let invoker = RecordingInvoker::new(|name, _| match name {
            "pump_fun_buy" => ToolCallResult::failure("bonding curve complete", None),
            _ => ToolCallResult::ok(json!({"signature": "sig123"})),
        });
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "buy 0.2 SOL of X").await;

        assert_eq!(invoker.call_count("jupiter_swap"), 1);
        let third = &adapter.conversations()[2];
        let tools = tool_messages(third);
        assert_eq!(tools[1].tool_call_id.as_deref(), Some("swap1"));
        assert!(tools[1].content.contains("DUPLICATE_TOOL_CALL"));
    }

    #[tokio::test]
    async fn test_blocked_substitute_surfaces_original_failure() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![
                call(
                    "swap1",
                    "jupiter_swap",
                    json!({"input_mint": WSOL_MINT, "output_mint": "X", "amount": 200_000_000u64, "slippage_bps": 500u64}),
                ),
                call("buy1", "pump_fun_buy", json!({"mint": "X", "amount": 0.2, "slippage": 5})),
            ]),
            Ok(ModelReply::text("done")),
        ]));
        let invoker = RecordingInvoker::new(|name, _| match name {
            "pump_fun_buy" => ToolCallResult::failure("bonding curve complete", None),
            _ => ToolCallResult::ok(json!({"signature": "sig123"})),
        });
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "buy X").await;

        assert_eq!(invoker.call_count("jupiter_swap"), 1);
        let second = &adapter.conversations()[1];
        let tools = tool_messages(second);
        assert_eq!(tools[1].tool_call_id.as_deref(), Some("buy1"));
        assert_eq!(tools[1].tool_name.as_deref(), Some("pump_fun_buy"));
        assert!(tools[1].content.contains("bonding curve complete"));
        assert_eq!(second.last().unwrap().role, Role::System);
    }

    #[tokio::test]
    async fn test_fallback_disabled_surfaces_failure() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![call("buy1", "pump_fun_buy", json!({"mint": "X", "amount": 0.2}))]),
            Ok(ModelReply::text("failed")),
        ]));
        let invoker = RecordingInvoker::new(|_, _| ToolCallResult::failure("Insufficient balance", None));
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new()))
            .with_fallback(FallbackPolicy::none());
        orch.run("s1", "buy").await;

        assert_eq!(invoker.call_count("jupiter_swap"), 0);
        let second = &adapter.conversations()[1];
        assert!(second
            .last()
            .map(|m| m.role == Role::System && m.content.starts_with("TOOL BALANCE ERROR"))
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_persists_history_without_system_or_final_reply() {
        let store = Arc::new(InMemorySessionStore::new());
        let h1 = Message::user("what's my balance?");
        let h2 = Message::assistant("You have 1.2 SOL.");
        store.seed("s1", vec![h1.clone(), h2.clone()]).await;
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![Ok(ModelReply::text("Hello again."))]));
        let orch = build(adapter, RecordingInvoker::succeeding(), store.clone());

        assert_eq!(orch.run("s1", "hi").await, "Hello again.");
        assert_eq!(
            store.snapshot("s1").await.unwrap(),
            vec![h1, h2, Message::user("hi")]
        );
    }

    #[tokio::test]
    async fn test_adapter_failure_returns_apology_and_persists_nothing() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![Err(LlmError::protocol(
            "openai",
            Some(401),
            "invalid api key",
        ))]));
        let store = Arc::new(InMemorySessionStore::new());
        let orch = build(adapter, RecordingInvoker::succeeding(), store.clone());

        let report = orch.run_turn("s1", "hi", &CancellationToken::new()).await;
        assert_eq!(report.reply, ADAPTER_FAILURE_REPLY);
        assert_eq!(report.outcome, TurnOutcome::Aborted);
        assert!(store.snapshot("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_balance_single_shot_and_cache() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![call("b1", "get_balance", json!({}))]),
            tools_reply(vec![call("b2", "get_balance", json!({"refresh": true}))]),
            Ok(ModelReply::text("You have 2 SOL.")),
        ]));
        let invoker = RecordingInvoker::new(|_, _| ToolCallResult::ok(json!({"sol": 2.0})));
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "balance?").await;

        assert_eq!(invoker.call_count("get_balance"), 1);
        assert_eq!(orch.cached_balance().await, Some(json!({"sol": 2.0})));
        let third = &adapter.conversations()[2];
        let tools = tool_messages(third);
        assert!(tools[1].content.contains("TOOL_ALREADY_SUCCEEDED"));
        assert!(third.last().unwrap().content.starts_with("STOP:"));
    }

    #[tokio::test]
    async fn test_fresh_balance_answered_from_cache_next_turn() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![call("b1", "get_balance", json!({}))]),
            Ok(ModelReply::text("You have 2 SOL.")),
            tools_reply(vec![call("b2", "get_balance", json!({}))]),
            Ok(ModelReply::text("Still 2 SOL.")),
        ]));
        let invoker = RecordingInvoker::new(|_, _| ToolCallResult::ok(json!({"sol": 2.0})));
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "balance?").await;
        orch.run("s1", "balance again?").await;

        assert_eq!(invoker.call_count("get_balance"), 1);
        let last = adapter.conversations().pop().unwrap();
        let reply = tool_messages(&last).into_iter().last().cloned().unwrap();
        assert_eq!(reply.tool_call_id.as_deref(), Some("b2"));
        let content: Value = serde_json::from_str(&reply.content).unwrap();
        assert_eq!(content, json!({"sol": 2.0}));
    }

    #[tokio::test]
    async fn test_other_wallet_balance_not_cached() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![call("b1", "get_balance", json!({"address": "SOMEONE_ELSE"}))]),
            Ok(ModelReply::text("They have 99 SOL.")),
            tools_reply(vec![call("b2", "get_balance", json!({}))]),
            Ok(ModelReply::text("You have 2 SOL.")),
        ]));
        let invoker = RecordingInvoker::new(|_, a| match a.get("address") {
            Some(addr) => ToolCallResult::ok(json!({"address": addr, "sol": 99})),
            None => ToolCallResult::ok(json!({"sol": 2})),
        });
        let orch = build(adapter, invoker.clone(), Arc::new(InMemorySessionStore::new()));

        orch.run("s1", "balance of SOMEONE_ELSE?").await;
        assert!(orch.cached_balance().await.is_none());

        orch.run("s1", "my balance?").await;
        assert_eq!(invoker.call_count("get_balance"), 2);
        assert_eq!(orch.cached_balance().await, Some(json!({"sol": 2})));
    }

    #[tokio::test]
    async fn test_token_data_cached_by_address() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![call("t1", "get_token_data", json!({"address": "BONK"}))]),
            Ok(ModelReply::text("BONK info.")),
            tools_reply(vec![
                call("t2", "get_token_data", json!({"address": "BONK"})),
                call("t3", "get_token_data", json!({"address": "WIF"})),
            ]),
            Ok(ModelReply::text("Both tokens.")),
        ]));
        let invoker = RecordingInvoker::new(|_, a| ToolCallResult::ok(json!({"symbol": a["address"]})));
        let orch = build(adapter, invoker.clone(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "bonk?").await;
        orch.run("s1", "bonk and wif?").await;

        let fetched: Vec<_> = invoker.calls().into_iter().map(|(_, a)| a["address"].clone()).collect();
        assert_eq!(fetched, vec![json!("BONK"), json!("WIF")]);
        assert_eq!(orch.cached_token_metadata("WIF").await, Some(json!({"symbol": "WIF"})));
    }

    #[tokio::test]
    async fn test_state_changing_tool_invalidates_balance() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![
                call("b1", "get_balance", json!({})),
                call("s1", "jupiter_swap", json!({"output_mint": "X", "amount": 1})),
            ]),
            Ok(ModelReply::text("Swapped.")),
        ]));
        let orch = build(adapter, RecordingInvoker::succeeding(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "swap").await;
        assert!(orch.cached_balance().await.is_none());
    }

    #[tokio::test]
    async fn test_call_limit_table() {
        let mut limits = HashMap::new();
        limits.insert("search_web".to_string(), 1);
        let guard = GuardConfig {
            call_limits: limits,
            ..GuardConfig::default()
        };
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![
                call("q1", "search_web", json!({"query": "a"})),
                call("q2", "search_web", json!({"query": "b"})),
            ]),
            Ok(ModelReply::text("ok")),
        ]));
        let invoker = RecordingInvoker::succeeding();
        let orch = build(adapter.clone(), invoker.clone(), Arc::new(InMemorySessionStore::new()))
            .with_settings(OrchestratorSettings::default().with_guard(guard));
        orch.run("s1", "search").await;

        assert_eq!(invoker.call_count("search_web"), 1);
        let tools = tool_messages(&adapter.conversations()[1]).into_iter().cloned().collect::<Vec<_>>();
        assert!(tools[1].content.contains("TOOL_CALL_LIMIT_EXCEEDED"));
    }

    #[tokio::test]
    async fn test_missing_query_filled_from_user_input() {
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![
            tools_reply(vec![call("q1", "search_web", json!({}))]),
            Ok(ModelReply::text("ok")),
        ]));
        let invoker = RecordingInvoker::succeeding();
        let orch = build(adapter, invoker.clone(), Arc::new(InMemorySessionStore::new()));
        orch.run("s1", "  latest solana news  ").await;
        assert_eq!(invoker.calls()[0].1["query"], "latest solana news");
    }

    #[tokio::test]
    async fn test_clear_and_compact() {
        let store = Arc::new(InMemorySessionStore::new());
        let history: Vec<Message> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{i}"))
                } else {
                    Message::assistant(format!("a{i}"))
                }
            })
            .collect();
        store.seed("s1", history.clone()).await;
        let adapter = Arc::new(ScriptedAdapter::sequence(vec![Ok(ModelReply::text("- traded BONK"))]));
        let orch = build(adapter.clone(), RecordingInvoker::succeeding(), store.clone());

        let msg = orch.compact_conversation("s1", 4).await.unwrap();
        assert_eq!(msg, "Conversation compacted! Summarized 6 old messages, kept 4 recent ones.");
        let saved = store.snapshot("s1").await.unwrap();
        assert_eq!(saved.len(), 5);
        assert!(saved[0].content.contains("- traded BONK"));
        assert_eq!(&saved[1..], &history[6..]);
        // 总结请求不带工具目录，只含一条 user 消息
        assert_eq!(adapter.conversations()[0].len(), 1);

        let again = orch.compact_conversation("s1", 4).await.unwrap();
        assert!(again.starts_with("Conversation is already compact"));

        assert_eq!(orch.clear_context("s1").await.unwrap(), CONTEXT_CLEARED_REPLY);
        assert!(store.snapshot("s1").await.is_none());
        assert_eq!(orch.stats().requests, 0);
    }
}

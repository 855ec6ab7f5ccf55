fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use serde_json::{Value, json};

    use blockfeed_protocol::{
        Block, Conversions, InboundMessage, ProjectedBlock, Topic, TopicEvent, WantRequest,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> Value {
        let data = read_fixture(name);
        serde_json::from_str(&data).unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Decodes a captured frame exactly as the read pump would.
    fn frame_events(name: &str) -> Vec<TopicEvent> {
        InboundMessage::parse(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to decode frame {name}: {e}"))
            .into_events()
    }

    fn topics(events: &[TopicEvent]) -> Vec<Topic> {
        events.iter().map(|e| e.topic).collect()
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    fn normalize_value(v: &Value) -> Value {
        match v {
            Value::Number(n) => n.as_f64().map_or_else(|| v.clone(), |f| json!(f)),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            Value::Array(arr) => Value::Array(arr.iter().map(normalize_value).collect()),
            _ => v.clone(),
        }
    }

    // --- Outbound ---

    #[test]
    fn want_request_matches_wire_form() {
        let want = WantRequest::new([Topic::Stats, Topic::Blocks, Topic::MempoolBlocks]);
        let sent: Value = serde_json::from_str(&want.to_json().unwrap()).unwrap();
        assert_eq!(sent, load_fixture("want_request.json"));
    }

    #[test]
    fn want_request_fixture_decodes() {
        let want: WantRequest = serde_json::from_value(load_fixture("want_request.json")).unwrap();
        assert_eq!(want.action, "want");
        assert_eq!(
            want.data,
            vec![Topic::Blocks, Topic::MempoolBlocks, Topic::Stats]
        );
    }

    // --- Inbound frames ---

    #[test]
    fn block_frame_ignores_unknown_fields() {
        let events = frame_events("ws_block.json");
        assert_eq!(topics(&events), vec![Topic::Blocks]);

        let block: Block = serde_json::from_value(events[0].payload.clone()).unwrap();
        assert_eq!(block.height, 840_000);
        assert_eq!(block.tx_count, 3050);
        assert_eq!(
            block.previous_block_hash.as_deref(),
            Some("0000000000000000000172014ba58d66455762add0512355ad651207918494ab")
        );
        let extras = block.extras.expect("extras");
        assert_eq!(extras.median_fee, 127.5);
        assert_eq!(extras.fee_range.len(), 7);
        assert_eq!(extras.pool.map(|p| p.slug), Some("viabtc".to_string()));
    }

    #[test]
    fn mempool_blocks_frame() {
        let events = frame_events("ws_mempool_blocks.json");
        assert_eq!(topics(&events), vec![Topic::MempoolBlocks]);

        let projected: Vec<ProjectedBlock> =
            serde_json::from_value(events[0].payload.clone()).unwrap();
        assert_eq!(projected.len(), 2);
        assert_eq!(projected[0].n_tx, 3120);
        assert_eq!(projected[0].block_vsize, 997_941.25);
        assert_eq!(projected[1].median_fee, 15.02);
    }

    #[test]
    fn conversions_frame_is_wrapped_for_stats() {
        let events = frame_events("ws_conversions.json");
        assert_eq!(topics(&events), vec![Topic::Stats]);
        assert_eq!(events[0].payload, load_fixture("ws_conversions.json"));

        let conversions: Conversions =
            serde_json::from_value(events[0].payload["conversions"].clone()).unwrap();
        assert_eq!(conversions.time, Some(1_713_571_800));
        assert_eq!(conversions.rate("USD"), Some(64_012.0));
        assert_eq!(conversions.rates.len(), 7);
    }

    #[test]
    fn combined_frame_fires_every_topic_in_order() {
        let fixture = load_fixture("ws_combined.json");
        let events = frame_events("ws_combined.json");

        assert_eq!(
            topics(&events),
            vec![Topic::Blocks, Topic::MempoolBlocks, Topic::Stats, Topic::Data]
        );
        assert_eq!(events[0].payload, fixture["block"]);
        assert_eq!(events[1].payload, fixture["mempool-blocks"]);
        assert_eq!(
            events[2].payload,
            json!({ "conversions": fixture["conversions"] })
        );
        assert_eq!(events[3].payload, fixture["data"]);
    }

    #[test]
    fn null_fields_produce_no_events() {
        let msg = InboundMessage::parse(&read_fixture("ws_nulls.json")).unwrap();
        assert!(msg.is_empty());
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn non_object_frames_are_rejected() {
        for text in ["[]", "42", "\"block\"", "null", "true"] {
            assert!(InboundMessage::parse(text).is_err(), "accepted {text}");
        }
    }

    // --- REST fallback payloads ---

    #[test]
    fn rest_blocks_decode_newest_first() {
        let blocks: Vec<Block> = serde_json::from_value(load_fixture("rest_blocks.json")).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].height > blocks[1].height);
        assert_eq!(blocks[0].previous_block_hash.as_deref(), Some(blocks[1].id.as_str()));
        assert!(blocks[0].extras.as_ref().is_some_and(|e| e.pool.is_none()));
    }

    #[test]
    fn rest_prices_match_pushed_conversions() {
        let polled: Conversions = serde_json::from_value(load_fixture("rest_prices.json")).unwrap();
        let pushed: Conversions =
            serde_json::from_value(load_fixture("ws_conversions.json")["conversions"].clone())
                .unwrap();
        assert_eq!(polled, pushed);

        let reserialized = serde_json::to_value(&polled).unwrap();
        assert_eq!(
            normalize_value(&reserialized),
            normalize_value(&load_fixture("rest_prices.json"))
        );
    }
}

//! Property-based tests for shuttle-inspector
//!
//! These tests verify correctness properties using proptest.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use shuttle_core::driver::InspectorCommand;
    use shuttle_core::types::{InspectionSummary, Plate, ShuttleAssignment};

    use crate::config::{CliOverrides, Config};
    use crate::console::{parse_line, ConsoleInput};
    use crate::output::{JsonResponse, OutputFormat, OutputFormatter};

    // ------------------------------------------------------------------------
    // Configuration overrides
    // ------------------------------------------------------------------------

    fn output_format_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("table".to_string()),
            Just("json".to_string()),
            Just("quiet".to_string()),
        ]
    }

    fn log_level_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("error".to_string()),
            Just("warn".to_string()),
            Just("info".to_string()),
            Just("debug".to_string()),
            Just("trace".to_string()),
        ]
    }

    fn url_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("https://fares.example.com/api".to_string()),
            Just("https://staging.example.org".to_string()),
            Just("http://localhost:3000/api".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// CLI output format wins over the config file
        #[test]
        fn test_config_override_output_format(
            config_format in output_format_strategy(),
            cli_format in output_format_strategy()
        ) {
            let mut config = Config::default();
            config.output.format = config_format;

            let overrides = CliOverrides {
                output_format: Some(cli_format.clone()),
                ..Default::default()
            };

            prop_assert_eq!(config.with_overrides(&overrides).output.format, cli_format);
        }

        /// CLI API URL and token win over the config file
        #[test]
        fn test_config_override_api(
            config_url in url_strategy(),
            cli_url in url_strategy(),
            token in "[A-Za-z0-9]{1,40}"
        ) {
            let mut config = Config::default();
            config.api.base_url = config_url;
            config.api.token = "from-file".into();

            let overrides = CliOverrides {
                api_url: Some(cli_url.clone()),
                token: Some(token.clone()),
                ..Default::default()
            };
            let result = config.with_overrides(&overrides);

            prop_assert_eq!(result.api.base_url.clone(), cli_url);
            prop_assert_eq!(result.api.token(), Some(token));
        }

        /// --debug always ends at debug level, whatever the file says
        #[test]
        fn test_config_override_debug_sets_log_level(
            config_level in log_level_strategy(),
            verbose in any::<bool>()
        ) {
            let mut config = Config::default();
            config.logging.level = config_level;

            let overrides = CliOverrides {
                verbose: Some(verbose),
                debug: Some(true),
                ..Default::default()
            };

            prop_assert_eq!(config.with_overrides(&overrides).logging.level, "debug");
        }

        /// Without overrides nothing changes
        #[test]
        fn test_config_preserves_values_when_no_override(
            format in output_format_strategy(),
            level in log_level_strategy(),
            url in url_strategy(),
            name in "[A-Za-z ]{0,30}"
        ) {
            let mut config = Config::default();
            config.output.format = format.clone();
            config.logging.level = level.clone();
            config.api.base_url = url.clone();
            config.inspector.name = name.clone();

            let result = config.with_overrides(&CliOverrides::default());

            prop_assert_eq!(result.output.format, format);
            prop_assert_eq!(result.logging.level, level);
            prop_assert_eq!(result.api.base_url, url);
            prop_assert_eq!(result.inspector.name, name);
        }
    }

    // ------------------------------------------------------------------------
    // Output formatting
    // ------------------------------------------------------------------------

    fn amount_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..100_000).prop_map(|c| Decimal::new(c, 2))
    }

    fn shuttle_strategy() -> impl Strategy<Value = ShuttleAssignment> {
        (
            1u32..10_000,
            "[A-Z]{3} [0-9]{3,4}",
            "[A-Za-z ]{1,20}",
            "[A-Za-z]{1,12}",
            "[A-Za-z]{1,12}",
            amount_strategy(),
        )
            .prop_map(|(id, plate, driver, origin, destination, added_rate)| {
                ShuttleAssignment {
                    id: id.to_string(),
                    driver,
                    plate: Plate::new(plate),
                    origin,
                    destination,
                    added_rate,
                    route_id: None,
                }
            })
    }

    fn summary_strategy() -> impl Strategy<Value = InspectionSummary> {
        (1u32..10_000, "[A-Z]{3} [0-9]{3,4}", amount_strategy()).prop_map(
            |(id, plate, total)| InspectionSummary {
                id: id.to_string(),
                driver: "Juan Cruz".into(),
                plate,
                origin: "Terminal".into(),
                destination: "Campus".into(),
                total_claimed_money: total,
                start_datetime: "2024-05-01 07:00:00".into(),
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn test_json_response_error_is_valid_json(
            error_msg in "[a-zA-Z0-9 :_-]{1,200}"
        ) {
            let response = JsonResponse::<()>::error(&error_msg);
            let json = serde_json::to_value(&response).unwrap();
            prop_assert_eq!(json["success"].as_bool(), Some(false));
            prop_assert!(json.get("error").is_some());
            prop_assert!(json.get("data").is_none());
        }

        #[test]
        fn test_quiet_mode_produces_empty_output(
            shuttles in prop::collection::vec(shuttle_strategy(), 0..5),
            history in prop::collection::vec(summary_strategy(), 0..5)
        ) {
            let formatter = OutputFormatter::new(OutputFormat::Quiet, false);
            prop_assert_eq!(formatter.format_shuttles(&shuttles), "");
            prop_assert_eq!(formatter.format_history(&history), "");
            prop_assert_eq!(formatter.format_pending(&[]), "");
        }

        /// JSON listings keep every row and carry an RFC 3339 timestamp
        #[test]
        fn test_json_listings_are_complete(
            shuttles in prop::collection::vec(shuttle_strategy(), 1..8),
            history in prop::collection::vec(summary_strategy(), 1..8)
        ) {
            let formatter = OutputFormatter::new(OutputFormat::Json, false);

            let json: serde_json::Value =
                serde_json::from_str(&formatter.format_shuttles(&shuttles)).unwrap();
            prop_assert_eq!(json["data"].as_array().map(|a| a.len()), Some(shuttles.len()));
            let ts = json["timestamp"].as_str().unwrap_or_default();
            prop_assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());

            let json: serde_json::Value =
                serde_json::from_str(&formatter.format_history(&history)).unwrap();
            prop_assert_eq!(json["data"].as_array().map(|a| a.len()), Some(history.len()));
        }

        #[test]
        fn test_table_lists_every_plate(
            shuttles in prop::collection::vec(shuttle_strategy(), 1..6)
        ) {
            let out = OutputFormatter::new(OutputFormat::Table, false).format_shuttles(&shuttles);
            for s in &shuttles {
                prop_assert!(out.contains(s.plate.as_str()));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Console parsing
    // ------------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any tag id typed after `tag` reaches the reader verbatim
        #[test]
        fn test_tag_ids_pass_through(tag in "[0-9A-Fa-f:]{1,24}") {
            let parsed = parse_line(&format!("tag {tag}"), &[]).unwrap();
            prop_assert_eq!(parsed, ConsoleInput::Tap(tag));
        }

        /// Numbers pick passenger types by position
        #[test]
        fn test_numbered_selection(
            labels in prop::collection::vec("[A-Z][a-z]{2,8}", 1..6),
            pick in 0usize..6
        ) {
            prop_assume!(pick < labels.len());
            let parsed = parse_line(&format!("type {}", pick + 1), &labels).unwrap();
            prop_assert_eq!(
                parsed,
                ConsoleInput::Command(InspectorCommand::SelectPassengerType(labels[pick].clone()))
            );
        }

        /// The parser never panics on arbitrary input
        #[test]
        fn test_parse_total(line in ".{0,80}") {
            let _ = parse_line(&line, &["Regular".to_string()]);
        }
    }
}

//! End-to-end engine tests against a mock web app tree.
//!
//! Exercises the full sequence (relocation, guarded anchor splices,
//! fallback chains) and the contract properties: double-run idempotence,
//! no-op on skip, all-or-nothing on failure, failure isolation, and strict
//! locator rank order.

use site_patcher::report::{AppliedDetail, StepOutcome};
use site_patcher::{config, runner, RunMode};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const EVENTS_ROUTE: &str = r#"var express = require('express');
var router = express.Router();

router.get('/', async function(req, res) {
  res.json({ events: [] });
});

module.exports = { router };
"#;

const EVENTS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<style>
.events-grid{display:grid}
</style>
</head>
<body>
<div id="eventsContainer"></div>
<script>
function renderEvents() {
  lucide.createIcons();
}
</script>
</body>
</html>
"#;

const STEPS: &str = r#"
[meta]
name = "recommended-events"
description = "Personalized recommendations: route, banner, sidebar feed"

[[relocations]]
id = "calendar-modal"
destination = "public/js/calendar-modal.js"
candidates = ["routes/calendar_modal.js", "lib/calendar_modal.js"]
name_tokens = ["calendar", "modal"]
extension = "js"

[[steps]]
id = "recommended-route"
artifact = "routes/events.js"

[steps.guard]
type = "contains"
needle = "/recommended"

[[steps.anchors]]
pattern = "module.exports = { router };"
placement = "insert-before"
payload = """
router.get('/recommended', async function(req, res) {
  res.json({ recommendations: [] });
});

"""

[[steps.anchors]]
pattern = "module.exports"
placement = "insert-before"
payload = """
router.get('/recommended', async function(req, res) {
  res.json({ recommendations: [] });
});

"""

[[steps]]
id = "banner-css"
artifact = "public/events.html"

[steps.guard]
type = "all-of"
needles = [".rec-section", "loadRecommended"]

[[steps.anchors]]
pattern = "</style>"
placement = "insert-before"
payload = ".rec-section{margin-bottom:24px}\n"

[[steps]]
id = "banner-js"
artifact = "public/events.html"

[steps.guard]
type = "contains"
needle = "loadRecommended"

[[steps.anchors]]
pattern = "</script>\n</body>"
placement = "insert-before"
payload = "async function loadRecommended() {}\n"
"#;

fn setup_app() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    fs::write(root.join("server.js"), "var app = require('express')();\n").unwrap();
    fs::create_dir_all(root.join("routes")).unwrap();
    fs::create_dir_all(root.join("public")).unwrap();
    fs::write(root.join("routes/events.js"), EVENTS_ROUTE).unwrap();
    fs::write(root.join("public/events.html"), EVENTS_HTML).unwrap();
    fs::write(
        root.join("routes/calendar_modal.js"),
        "function openCalendarModal() {}\n",
    )
    .unwrap();

    dir
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

#[test]
fn test_full_run_then_rerun_is_idempotent() {
    let app = setup_app();
    let steps = config::load_from_str(STEPS).unwrap();

    let first = runner::run(&steps, app.path(), RunMode::Apply);
    assert_eq!(first.failed_count(), 0, "first run: {first:?}");
    assert_eq!(first.applied_count(), 4);

    let route = read(app.path(), "routes/events.js");
    assert!(route.contains("/recommended"));
    // Primary anchor present, so the payload landed right before it.
    assert!(route.contains("});\n\nmodule.exports = { router };"));

    let html = read(app.path(), "public/events.html");
    assert!(html.contains(".rec-section{margin-bottom:24px}\n</style>"));
    assert!(html.contains("async function loadRecommended() {}\n</script>\n</body>"));

    let modal = read(app.path(), "public/js/calendar-modal.js");
    assert!(modal.contains("openCalendarModal"));

    // Second run: byte-identical artifacts, everything Skipped.
    let route_before = read(app.path(), "routes/events.js");
    let html_before = read(app.path(), "public/events.html");

    let second = runner::run(&steps, app.path(), RunMode::Apply);
    assert_eq!(second.applied_count(), 0);
    assert_eq!(second.failed_count(), 0);
    assert_eq!(second.skipped_count(), second.results.len());

    assert_eq!(read(app.path(), "routes/events.js"), route_before);
    assert_eq!(read(app.path(), "public/events.html"), html_before);
}

#[test]
fn test_fallback_anchor_applies_and_is_attributed() {
    let app = setup_app();
    // Strip the primary anchor: exports without the destructured form.
    fs::write(
        app.path().join("routes/events.js"),
        "var router = {};\nmodule.exports.router = router;\n",
    )
    .unwrap();

    let steps = config::load_from_str(STEPS).unwrap();
    let report = runner::run(&steps, app.path(), RunMode::Apply);

    let route_result = report
        .results
        .iter()
        .find(|r| r.step_id == "recommended-route")
        .unwrap();

    match &route_result.outcome {
        StepOutcome::Applied {
            detail: AppliedDetail::Spliced {
                anchor_index,
                anchor_pattern,
            },
        } => {
            assert_eq!(*anchor_index, 1);
            assert_eq!(anchor_pattern, "module.exports");
        }
        other => panic!("expected fallback splice, got {other:?}"),
    }

    let route = read(app.path(), "routes/events.js");
    assert!(route.contains("/recommended"));
}

#[test]
fn test_unmatched_step_fails_without_mutation_and_in_isolation() {
    let app = setup_app();
    // events.html loses every anchor the css step knows about.
    fs::write(app.path().join("public/events.html"), "<html></html>\n").unwrap();

    let steps = config::load_from_str(STEPS).unwrap();
    let report = runner::run(&steps, app.path(), RunMode::Apply);

    let css = report
        .results
        .iter()
        .find(|r| r.step_id == "banner-css")
        .unwrap();
    match &css.outcome {
        StepOutcome::Failed { reason } => {
            assert!(reason.contains("</style>"), "reason was: {reason}");
        }
        other => panic!("expected Failed, got {other:?}"),
    }

    // All-or-nothing: the broken artifact is untouched.
    assert_eq!(read(app.path(), "public/events.html"), "<html></html>\n");

    // Isolation: the route step on the other artifact still applied.
    let route = report
        .results
        .iter()
        .find(|r| r.step_id == "recommended-route")
        .unwrap();
    assert!(route.outcome.is_applied());
    assert_eq!(report.status(), site_patcher::RunStatus::Partial);
}

#[test]
fn test_locator_prefers_rank_order_over_scan() {
    let app = setup_app();
    // Both ranked candidates exist; a scan-discoverable decoy exists too.
    fs::create_dir_all(app.path().join("lib")).unwrap();
    fs::write(app.path().join("lib/calendar_modal.js"), "second choice").unwrap();
    fs::create_dir_all(app.path().join("scripts")).unwrap();
    fs::write(app.path().join("scripts/calendar-modal-old.js"), "decoy").unwrap();

    let steps = config::load_from_str(STEPS).unwrap();
    let report = runner::run(&steps, app.path(), RunMode::Apply);

    let relocation = report
        .results
        .iter()
        .find(|r| r.step_id == "calendar-modal")
        .unwrap();
    match &relocation.outcome {
        StepOutcome::Applied {
            detail: AppliedDetail::Relocated { source },
        } => {
            assert_eq!(source, Path::new("routes/calendar_modal.js"));
        }
        other => panic!("expected Relocated, got {other:?}"),
    }

    assert!(read(app.path(), "public/js/calendar-modal.js").contains("openCalendarModal"));
}

#[test]
fn test_check_mode_reports_without_writing() {
    let app = setup_app();
    let route_before = read(app.path(), "routes/events.js");
    let html_before = read(app.path(), "public/events.html");

    let steps = config::load_from_str(STEPS).unwrap();
    let report = runner::run(&steps, app.path(), RunMode::Check);

    assert_eq!(report.applied_count(), 4);
    assert_eq!(read(app.path(), "routes/events.js"), route_before);
    assert_eq!(read(app.path(), "public/events.html"), html_before);
    assert!(!app.path().join("public/js/calendar-modal.js").exists());
}

mod splice_properties {
    use proptest::prelude::*;
    use site_patcher::{AnchorCandidate, AnchorSpec, Placement};

    const ANCHOR: &str = "@@ANCHOR@@";

    fn spec(placement: Placement, payload: &str) -> AnchorSpec {
        AnchorSpec {
            candidates: vec![AnchorCandidate {
                pattern: ANCHOR.to_string(),
                placement,
                payload: payload.to_string(),
            }],
        }
    }

    proptest! {
        /// Insert-before keeps everything around the anchor intact.
        #[test]
        fn insert_before_preserves_surroundings(
            pre in "[a-z \n]{0,40}",
            post in "[a-z \n]{0,40}",
            payload in "[A-Z0-9\n]{0,40}",
        ) {
            let content = format!("{pre}{ANCHOR}{post}");
            let resolved = spec(Placement::InsertBefore, &payload)
                .resolve(&content)
                .unwrap();
            prop_assert_eq!(resolved.content, format!("{pre}{payload}{ANCHOR}{post}"));
        }

        /// Replace swaps exactly the anchor span, nothing else.
        #[test]
        fn replace_swaps_exactly_the_anchor(
            pre in "[a-z \n]{0,40}",
            post in "[a-z \n]{0,40}",
            payload in "[A-Z0-9\n]{0,40}",
        ) {
            let content = format!("{pre}{ANCHOR}{post}");
            let resolved = spec(Placement::Replace, &payload)
                .resolve(&content)
                .unwrap();
            prop_assert_eq!(resolved.content, format!("{pre}{payload}{post}"));
        }

        /// An unmatched chain resolves to an error, never altered content.
        #[test]
        fn no_match_is_an_error(content in "[a-z \n]{0,60}") {
            prop_assert!(spec(Placement::InsertAfter, "x").resolve(&content).is_err());
        }
    }
}

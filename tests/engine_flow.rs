mod common;

use common::{Mock, run_script, traced};
use mimic::capability::Capabilities;
use mimic::config::{EngineConfig, Repeat};
use mimic::engine::{Origin, RunStatus, Session, run_session};
use mimic::script::parse_program;

#[test]
fn label_quota_scenario_presses_three_times() {
    let mock = Mock::new();
    let report = run_script(
        "#L*2\n>press A, delay=0,T=0s000\n>jump #L, T=0s000",
        mock.caps(),
        traced(),
    );

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(mock.presses("A"), 3);
    // label, press, jump visited three times each
    assert_eq!(report.trace_lines(), vec![1, 2, 3, 1, 2, 3, 1, 2, 3]);
    assert_eq!(report.elapsed_ms, 0);
}

#[test]
fn delays_space_out_instructions() {
    let mock = Mock::new();
    let report = run_script(
        ">按A, 延遲100ms\n>按B, 延遲50ms\n>按C",
        mock.caps(),
        traced(),
    );

    let times: Vec<u64> = report.trace.unwrap().iter().map(|entry| entry.at_ms).collect();
    assert_eq!(times, vec![0, 100, 150]);
    assert_eq!(mock.actions(), vec!["press A", "press B", "press C"]);
    assert_eq!(report.elapsed_ms, 150);
}

#[test]
fn playback_speed_scales_delays() {
    let mut config = EngineConfig::default();
    config.playback.speed = 2.0;
    let report = run_script(">按A, 延遲1s\n>按B, 延遲500ms", Mock::new().caps(), config);
    assert_eq!(report.elapsed_ms, 750);
}

#[test]
fn branches_follow_the_last_outcome() {
    let source = "\
>if>target
>>#hit
>>>#miss
#miss
>按M
>停止
#hit
>按H
";
    let mock = Mock::new();
    mock.show("target");
    let report = run_script(source, mock.caps(), EngineConfig::default());
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(mock.actions(), vec!["press H"]);

    let mock = Mock::new();
    let report = run_script(source, mock.caps(), EngineConfig::default());
    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(mock.actions(), vec!["press M"]);
}

#[test]
fn empty_branch_target_falls_through() {
    let mock = Mock::new();
    mock.show("target");
    run_script(">if>target\n>>\n>按A", mock.caps(), EngineConfig::default());
    assert_eq!(mock.actions(), vec!["press A"]);
}

#[test]
fn stop_ends_the_run_normally() {
    let mock = Mock::new();
    let report = run_script(">按A\n>停止\n>按B", mock.caps(), EngineConfig::default());
    assert_eq!(report.status, RunStatus::Stopped);
    assert!(report.status.is_normal());
    assert_eq!(mock.actions(), vec!["press A"]);
}

#[test]
fn ocr_without_provider_resolves_false() {
    let source = "\
>if文字>登入
>>#seen
>等待文字>完成, 最長30s
>點擊文字>確定
>按N
#seen
>按Y
";
    let mock = Mock::new();
    let report = run_script(source, mock.caps(), EngineConfig::default());

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.faults.is_empty());
    assert_eq!(mock.actions(), vec!["press N", "press Y"]);
    // Nothing to wait on.
    assert_eq!(report.elapsed_ms, 0);
}

#[test]
fn text_waits_poll_until_timeout_or_match() {
    let mock = Mock::new();
    let report = run_script(">等待文字>完成, 最長1s\n>按A", mock.full_caps(), EngineConfig::default());
    assert_eq!(report.elapsed_ms, 1_000);
    assert_eq!(mock.actions(), vec!["press A"]);

    let mock = Mock::new();
    mock.show_text("完成");
    let report = run_script(">等待文字>完成, 最長1s\n>點擊文字>完成", mock.full_caps(), EngineConfig::default());
    assert_eq!(report.elapsed_ms, 0);
    assert_eq!(mock.actions(), vec!["click left (5,5)"]);
}

#[test]
fn image_actions_target_the_match() {
    let mock = Mock::new();
    mock.show("ok");
    run_script(">移動至>ok\n>右鍵點擊>ok\n>左鍵點擊>missing", mock.caps(), EngineConfig::default());
    assert_eq!(mock.actions(), vec!["move (12,12)", "click right (12,12)"]);
}

#[test]
fn locate_any_matches_first_visible() {
    let mock = Mock::new();
    mock.show("b");
    run_script(">辨識任一>a|b\n>>#found\n>停止\n#found\n>按F", mock.caps(), EngineConfig::default());
    assert_eq!(mock.actions(), vec!["press F"]);
}

#[test]
fn repeat_rounds_reset_quotas() {
    let mut config = traced();
    config.playback.repeat = Repeat::Times(2);
    config.playback.repeat_interval_ms = 500;

    let mock = Mock::new();
    let report = run_script("#L*1\n>按A, 延遲100ms\n>跳到#L", mock.caps(), config);

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.rounds, 2);
    assert_eq!(mock.presses("A"), 4);
    // second round starts 500 ms after the first ends at 200 ms
    assert_eq!(report.elapsed_ms, 900);
}

#[test]
fn time_limit_ends_endless_repeat() {
    let mut config = EngineConfig::default();
    config.playback.repeat = Repeat::Forever;
    config.playback.time_limit_ms = Some(3_500);

    let mock = Mock::new();
    let report = run_script(">按A, 延遲1s", mock.caps(), config);

    assert_eq!(report.status, RunStatus::TimeLimitReached);
    assert_eq!(report.elapsed_ms, 3_500);
    assert_eq!(mock.presses("A"), 4);
}

#[test]
fn held_keys_are_released_at_the_end() {
    let mock = Mock::new();
    run_script(">按下Shift\n>按A\n>停止", mock.caps(), EngineConfig::default());
    assert_eq!(mock.actions(), vec!["down Shift", "press A", "up Shift"]);
}

#[test]
fn unavailable_input_is_skipped() {
    // The mock has no scroll wheel.
    let mock = Mock::new();
    let report = run_script(">按A\n>滾輪(1,1,-3)\n>按B", mock.caps(), EngineConfig::default());

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.faults.is_empty());
    assert_eq!(mock.actions(), vec!["press A", "press B"]);
}

#[test]
fn mouse_buttons_named_in_english() {
    let mock = Mock::new();
    let report = run_script(
        ">按下left鍵(100,100)\n>放開left鍵(500,500)",
        mock.caps(),
        EngineConfig::default(),
    );

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        mock.actions(),
        vec!["mouse down left (100,100)", "mouse up left (500,500)"]
    );
}

#[test]
fn input_failure_on_main_faults_the_run() {
    let mock = Mock::new();
    mock.fail_key("A");
    let report = run_script(">按B\n>按A\n>按C", mock.caps(), EngineConfig::default());

    match report.status {
        RunStatus::Faulted { line, reason } => {
            assert_eq!(line, 2);
            assert!(reason.contains("jammed"));
        }
        other => panic!("expected fault, got {:?}", other),
    }
    assert_eq!(mock.actions(), vec!["press B"]);
}

#[test]
fn drift_beyond_threshold_is_counted() {
    let report = run_script(
        ">按A, 延遲3000ms, T=0s000\n>按B, T=0s500\n>按C, T=3s000",
        Mock::new().caps(),
        EngineConfig::default(),
    );
    assert_eq!(report.drift_warnings, 1);
}

#[test]
fn external_stop_aborts_before_anything_runs() {
    let mock = Mock::new();
    let program = parse_program("t", ">按A").unwrap();
    let session = Session::new(program, mock.caps(), EngineConfig::default()).unwrap();
    session.control().stop();

    let report = run_session(session);
    assert_eq!(report.status, RunStatus::Aborted);
    assert!(!report.status.is_normal());
    assert!(mock.actions().is_empty());
}

#[test]
fn trace_records_origins() {
    let report = run_script(">按A", Capabilities::new(Mock::new()), traced());
    let trace = report.trace.unwrap();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].origin, Origin::Main);
}

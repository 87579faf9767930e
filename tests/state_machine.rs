mod common;

use common::{Mock, run_script, traced};
use mimic::config::EngineConfig;
use mimic::engine::{Origin, RunStatus};

const COMBAT: &str = "\
>machine>combat
>state>Idle, initial
>按I
>if>target, 延遲100ms
>switch>success>Attack
>switch>failure>Idle
>state>Attack
>按A
>switch>default>Idle
>end-machine
";

#[test]
fn idle_and_attack_alternate_with_the_target() {
    let mock = Mock::new();
    mock.sequence("target", &[true, false, true, false, true, false]);
    let mut config = EngineConfig::default();
    config.playback.time_limit_ms = Some(650);

    let report = run_script(COMBAT, mock.caps(), config);

    assert_eq!(report.status, RunStatus::TimeLimitReached);
    let visits: Vec<String> = mock
        .actions()
        .into_iter()
        .map(|action| action.trim_start_matches("press ").to_string())
        .collect();
    assert_eq!(
        visits,
        vec!["I", "A", "I", "I", "A", "I", "I", "A", "I", "I"]
    );
    assert_eq!(mock.lookups("target"), 7);
}

#[test]
fn state_bodies_run_on_the_primary_cursor() {
    let mock = Mock::new();
    mock.show("target");
    let mut config = traced();
    config.playback.time_limit_ms = Some(150);

    let report = run_script(COMBAT, mock.caps(), config);
    let trace = report.trace.unwrap();
    let attack = trace.iter().find(|entry| entry.line == 8).unwrap();
    assert_eq!(attack.origin, Origin::State { machine: 0, state: 1 });
    assert_eq!(attack.at_ms, 100);
}

#[test]
fn state_without_matching_transition_halts_the_machine() {
    let source = "\
>狀態機>m
>狀態>a, 初始
>按X
>狀態>b
>按Y
>狀態機結束
>按Z
";
    let mock = Mock::new();
    let report = run_script(source, mock.caps(), EngineConfig::default());
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(mock.actions(), vec!["press X", "press Z"]);
}

#[test]
fn outcomes_do_not_leak_between_visits() {
    let source = "\
>狀態機>m
>狀態>a, 初始
>if>x
>切換>success>b
>狀態>b
>切換>success>c
>切換>default>d
>狀態>c
>按C
>狀態>d
>按D
>狀態機結束
";
    let mock = Mock::new();
    mock.show("x");
    run_script(source, mock.caps(), EngineConfig::default());
    assert_eq!(mock.actions(), vec!["press D"]);
}

#[test]
fn default_transition_is_tried_last() {
    let source = "\
>狀態機>m
>狀態>a, 初始
>if>x
>切換>default>d
>切換>failure>f
>狀態>d
>按D
>狀態>f
>按F
>狀態機結束
";
    let mock = Mock::new();
    run_script(source, mock.caps(), EngineConfig::default());
    assert_eq!(mock.actions(), vec!["press F"]);
}

#[test]
fn stop_inside_a_state_ends_the_run() {
    let source = "\
>狀態機>m
>狀態>a, 初始
>按A
>停止
>狀態機結束
>按Z
";
    let mock = Mock::new();
    let report = run_script(source, mock.caps(), EngineConfig::default());
    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(mock.actions(), vec!["press A"]);
}

#[test]
fn input_failure_in_a_state_faults_the_run() {
    let source = "\
>狀態機>m
>狀態>a, 初始
>按A
>狀態機結束
";
    let mock = Mock::new();
    mock.fail_key("A");
    let report = run_script(source, mock.caps(), EngineConfig::default());
    assert!(matches!(report.status, RunStatus::Faulted { line: 3, .. }));
}

#[test]
fn priority_preempts_a_state_body() {
    let source = "\
>優先偵測>hp
>按H
>優先偵測結束
>狀態機>m
>狀態>a, 初始
>按A, 延遲500ms
>按B
>狀態機結束
";
    let mock = Mock::new();
    mock.sequence("hp", &[false, true]);
    let report = run_script(source, mock.caps(), EngineConfig::default());
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(mock.actions(), vec!["press A", "press H", "press B"]);
}

#[test]
fn zero_delay_state_loop_yields_until_time_limit() {
    let source = "\
>狀態機>m
>狀態>spin, 初始
>按S
>切換>default>spin
>狀態機結束
";
    let mock = Mock::new();
    let mut config = EngineConfig::default();
    config.max_steps_per_tick = 50;
    config.playback.time_limit_ms = Some(3);
    let report = run_script(source, mock.caps(), config);

    assert_eq!(report.status, RunStatus::TimeLimitReached);
    assert!(mock.presses("S") >= 3 * 50);
}

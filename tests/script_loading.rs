use mimic::script::{
    BlockKind, InstructionKind, LoadError, Scope, TriggerKind, load_script, parse_program,
};
use tempfile::TempDir;

const FARM: &str = "\
// daily farm route
#start*3
>按F1, 延遲200ms, T=0s000
>移動至(640,360), 50ms, T=0s200
>左鍵點擊(640,360), T=0s250

>if>pic_chest
>>#open
>>>
>跳到#start
#open
>點擊文字>領取, T=1s000

>定時觸發>30秒
>按F5
>定時結束

>並行開始
>線程>buff
>按下Shift, 延遲100ms
>放開Shift
>線程結束
>線程>move
>滾輪(100,100,-3)
>線程結束
>並行結束

>狀態機>combat
>狀態>idle, 初始
>辨識>target
>切換>success>attack
>切換>default>idle
>狀態>attack
>按A
>切換>default>idle
>狀態機結束
>停止
";

#[test]
fn full_script_builds_every_table() {
    let program = parse_program("farm", FARM).unwrap();

    assert_eq!(program.labels.len(), 2);
    assert_eq!(program.labels[0].quota, Some(3));
    assert_eq!(program.labels[1].scope, Scope::Main);
    assert_eq!(program.parallels.len(), 1);
    assert_eq!(program.parallels[0].threads.len(), 2);
    assert_eq!(program.triggers.len(), 1);
    assert_eq!(program.triggers[0].kind, TriggerKind::Timer { interval_ms: 30_000 });
    assert_eq!(program.machines.len(), 1);
    assert_eq!(program.machines[0].states.len(), 2);
    assert_eq!(program.instructions.last().map(|i| &i.kind), Some(&InstructionKind::Stop));

    let first = &program.instructions[1];
    assert_eq!(first.line, 3);
    assert_eq!(first.delay_ms, 200);
    assert_eq!(first.timestamp_ms, Some(0));
}

#[test]
fn program_serializes_for_inspection() {
    let program = parse_program("farm", FARM).unwrap();
    let json: serde_json::Value = serde_json::to_value(&program).unwrap();
    assert_eq!(json["name"], "farm");
    assert_eq!(json["instructions"][1]["kind"]["kind"], "key_press");
    assert_eq!(json["labels"][0]["quota"], 3);
}

#[test]
fn scripts_load_from_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("route.txt");
    std::fs::write(&path, format!("\u{feff}{}", FARM)).unwrap();

    let program = load_script(&path).unwrap();
    assert_eq!(program.name, "route");
    assert_eq!(program.instructions, parse_program("x", FARM).unwrap().instructions);
}

#[test]
fn missing_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = load_script(&temp.path().join("missing.txt")).unwrap_err();
    assert!(err.to_string().contains("Failed to read script"));
}

#[test]
fn load_errors_name_their_line() {
    let cases: &[(&str, usize)] = &[
        (">按A\n>飛到(1,2)", 2),
        (">按A\n>移動至(1,)", 2),
        ("#a*0\n>按A", 1),
        (">按A\n>跳到#nowhere", 2),
        ("#a\n#a", 2),
        (">按A\n>>#x\n#x", 2),
        (">並行開始\n>線程>a\n>按A\n>並行結束", 4),
        (">狀態機>m\n>狀態>a\n>狀態機結束", 1),
        (">每隔>1s\n>按A", 1),
    ];
    for (source, line) in cases {
        let err = parse_program("t", source).unwrap_err();
        assert_eq!(err.line(), *line, "{}: {}", source.replace('\n', " | "), err);
    }
}

#[test]
fn unclosed_blocks_are_reported() {
    assert_eq!(
        parse_program("t", ">優先偵測>hp\n>按H").unwrap_err(),
        LoadError::UnclosedBlock {
            line: 1,
            kind: BlockKind::PriorityTrigger
        }
    );
}

#[test]
fn thread_labels_are_scoped() {
    let source = "\
>並行開始
>線程>a
#loop*2
>按A
>跳到#loop
>線程結束
>並行結束
";
    let program = parse_program("t", source).unwrap();
    assert_eq!(program.labels[0].scope, Scope::Thread { block: 0, thread: 0 });

    let crossing = "#top\n>並行開始\n>線程>a\n>跳到#top\n>線程結束\n>並行結束";
    assert!(matches!(
        parse_program("t", crossing).unwrap_err(),
        LoadError::CrossScopeJump { line: 4, .. }
    ));
}

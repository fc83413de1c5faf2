//! Property tests for the validator and renderer.

use proptest::prelude::*;
use voxshell_core::safety::DEFAULT_ALLOWED_PROGRAMS;
use voxshell_core::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_allowed_program() -> impl Strategy<Value = String> {
    prop::sample::select(DEFAULT_ALLOWED_PROGRAMS).prop_map(|p| p.to_string())
}

fn arb_unknown_program() -> impl Strategy<Value = String> {
    "[a-z]{3,10}".prop_filter("must not be allow-listed", |p| {
        !DEFAULT_ALLOWED_PROGRAMS.contains(&p.as_str()) && p != "fsutil"
    })
}

/// Plain relative tokens that no deny rule cares about
fn arb_plain_args() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9_]{1,12}", 0..6)
}

fn arb_dangerous_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("-rf".to_string()),
        Just("-fr".to_string()),
        Just("--no-preserve-root".to_string()),
        Just("/dev/sda".to_string()),
        Just("~".to_string()),
        Just("../etc".to_string()),
        Just("/etc/passwd".to_string()),
        "[a-z]{1,5}".prop_map(|s| format!("{};reboot", s)),
        "[a-z]{1,5}".prop_map(|s| format!("$({})", s)),
        "[a-z]{1,5}".prop_map(|s| format!("{}|sh", s)),
        "[a-z]{1,5}".prop_map(|s| format!(">{}", s)),
    ]
}

fn command(program: String, args: Vec<String>) -> CommandLine {
    CommandLine::new(program, args)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// A deny pattern vetoes an allow-listed program wherever it appears
    #[test]
    fn deny_list_is_a_hard_veto(
        program in arb_allowed_program(),
        mut args in arb_plain_args(),
        token in arb_dangerous_token(),
        position in any::<prop::sample::Index>(),
        destructive in any::<bool>(),
    ) {
        let at = position.index(args.len() + 1);
        args.insert(at, token);

        let policy = SafetyPolicy::new(OsFamily::Unix);
        prop_assert_eq!(
            policy.validate(&command(program, args), destructive),
            SafetyVerdict::Rejected(RejectionReason::DangerousPattern)
        );
    }

    /// Anything not on the allow-list is refused, whatever its arguments
    #[test]
    fn unknown_programs_are_denied(
        program in arb_unknown_program(),
        args in arb_plain_args(),
        destructive in any::<bool>(),
    ) {
        for os in [OsFamily::Unix, OsFamily::Windows] {
            let policy = SafetyPolicy::new(os);
            prop_assert_eq!(
                policy.validate(&command(program.clone(), args.clone()), destructive),
                SafetyVerdict::Rejected(RejectionReason::NotWhitelisted)
            );
        }
    }

    /// Same input, same verdict
    #[test]
    fn validate_is_pure(line in "\\PC{0,40}", destructive in any::<bool>()) {
        let policy = SafetyPolicy::new(OsFamily::Unix);
        let first = policy.validate_line(&line, destructive);
        prop_assert_eq!(policy.validate_line(&line, destructive), first);
    }

    /// The destructive flag only moves Allowed to AllowedDestructive
    #[test]
    fn destructive_flag_only_adds_confirmation(
        program in arb_allowed_program(),
        args in arb_plain_args(),
    ) {
        let policy = SafetyPolicy::new(OsFamily::Unix);
        let cmd = command(program, args);
        prop_assert_eq!(policy.validate(&cmd, false), SafetyVerdict::Allowed);
        prop_assert_eq!(policy.validate(&cmd, true), SafetyVerdict::AllowedDestructive);
    }

    /// Slot values land in the argument vector verbatim or not at all
    #[test]
    fn render_substitutes_literally(value in "\\PC{1,20}") {
        let library = IntentLibrary::builtin().unwrap();
        let definition = &library.get(IntentId::CreateFolder).unwrap().definition;

        let mut slots = SlotValues::new();
        slots.insert("name".to_string(), value.clone());

        match render(definition, &slots, OsFamily::Unix) {
            Ok(line) => {
                prop_assert_eq!(line.program.as_str(), "mkdir");
                prop_assert_eq!(line.args, vec![value]);
            }
            Err(RenderError::TemplateInjection { slot }) => {
                prop_assert_eq!(slot.as_str(), "name");
                prop_assert!(value.contains('{') || value.contains('}') || value.starts_with('-'), "injection flagged for benign value {:?}", value);
            }
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }

    /// cmd.exe switches spoken as a slot never reach a Windows command line
    #[test]
    fn windows_switches_are_not_rendered(
        switch in "/[A-Za-z?]{1,2}(:[a-z]{1,3})?",
        intent in prop::sample::select(vec![IntentId::DeleteFile, IntentId::CopyFile, IntentId::ListFiles]),
    ) {
        let library = IntentLibrary::builtin().unwrap();
        let definition = &library.get(intent).unwrap().definition;

        let mut slots = SlotValues::new();
        for spec in &definition.slots {
            slots.insert(spec.name.clone(), switch.clone());
        }

        let rendered = render(definition, &slots, OsFamily::Windows);
        prop_assert!(
            matches!(rendered, Err(RenderError::TemplateInjection { .. })),
            "{:?}",
            rendered
        );
    }
}

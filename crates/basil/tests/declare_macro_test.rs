use basil::{declare, Context, TestRunner};

fn form_is_visible() -> bool {
    true
}

fn rejects_bad_passwords(_: Context<'_>) {}

#[test]
fn names_come_from_literal_function_or_body() {
    let runner = TestRunner::new();
    let root = declare!(runner, "Login flow", |ctx| {
        declare!(ctx, |_| { assert!(form_is_visible()); });
        declare!(ctx, rejects_bad_passwords);
        declare!(ctx, "explicitly named", |_| {});
    });

    assert_eq!(root.name(), "Login flow");
    let names: Vec<String> = root.children().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(
        names,
        ["assert form_is_visible", "rejects_bad_passwords", "explicitly named"]
    );
    assert!(root.has_passed());
}

#[test]
fn empty_body_falls_back_to_no_name() {
    let runner = TestRunner::new();
    let root = declare!(runner, |_| {});
    assert_eq!(root.name(), basil::name::NO_NAME);
}

#[test]
fn source_text_is_kept_for_failing_bodies() {
    let runner = TestRunner::new();
    let root = declare!(runner, "checkout", |ctx| {
        declare!(ctx, "charges the card", |_| {
            let charged = 0;
            assert_eq!(charged, 42, "card was not charged");
        });
    });

    let children = root.children();
    let failed = &children[0];
    assert!(failed.source().unwrap().contains("charged"));

    let inspection = failed.inspect().unwrap();
    assert_eq!(inspection.source, failed.source());
    assert!(failed.error().unwrap().message().contains("card was not charged"));
    assert!(!root.has_passed());
}

#[test]
fn expression_bodies_are_slugged_too() {
    let runner = TestRunner::new();
    let root = declare!(runner, "math", |ctx| {
        declare!(ctx, |_| assert_eq!(2 + 3, 5));
    });
    assert_eq!(root.children()[0].name(), "assert_eq 2 3 5");
}

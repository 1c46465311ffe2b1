//! Colored, indented tree output for finished test trees.
//!
//! Used from `harness = false` test targets:
//!
//! ```text
//! Login flow
//!   ✓ shows the form
//!   ✗ rejects a bad password (expected 401, got 200)
//!   - waits for the session callback
//! ```
//!
//! The reporter only reads [`Test`] nodes; it never changes a tree.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::context::Context;
use crate::error::Outcome;
use crate::node::Test;
use crate::runner::TestRunner;

// ============================================================================
// ANSI color helpers
// ============================================================================

fn use_color() -> bool {
    // Respect NO_COLOR env var (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

fn paint(code: &str, s: &str) -> String {
    if use_color() {
        format!("\x1b[{code}m{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

fn green(s: &str) -> String {
    paint("32", s)
}

fn red(s: &str) -> String {
    paint("31", s)
}

fn yellow(s: &str) -> String {
    paint("33", s)
}

fn dim(s: &str) -> String {
    paint("2", s)
}

// ============================================================================
// Configuration
// ============================================================================

/// Reporter configuration, from the environment and command-line args.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Only declare top-level tests whose name contains this
    /// (case-insensitive).
    pub filter: Option<String>,
    /// Leave passed nodes out of the printed tree. They are still counted.
    pub hide_passed: bool,
}

impl RunConfig {
    /// Read `BASIL_FILTER` and `BASIL_HIDE_PASSED`, then apply the process
    /// args (compatible with `cargo test -- <args>`).
    pub fn from_args() -> Self {
        let mut config = RunConfig {
            filter: std::env::var("BASIL_FILTER").ok().filter(|f| !f.is_empty()),
            hide_passed: env_flag("BASIL_HIDE_PASSED"),
        };
        config.apply_args(std::env::args().skip(1));
        config
    }

    /// Apply args: `--hide-passed`, and a positional filter. Other flags are
    /// ignored so libtest-style flags pass through harmlessly.
    pub fn apply_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            match arg.as_ref() {
                "--hide-passed" => self.hide_passed = true,
                arg if !arg.starts_with('-') => self.filter = Some(arg.to_string()),
                _ => {}
            }
        }
    }

    /// Whether a top-level test called `name` should be declared.
    pub fn includes(&self, name: &str) -> bool {
        matches_filter(name, self.filter.as_deref())
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Case-insensitive substring match; no filter matches everything.
pub fn matches_filter(name: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(f) if !f.is_empty() => name.to_lowercase().contains(&f.to_lowercase()),
        _ => true,
    }
}

/// Stable identity for a node: its ancestors' names and its own, joined.
/// Suitable as a key in an external preference store.
pub fn full_name<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" > ")
}

// ============================================================================
// Results
// ============================================================================

/// Node and pass counts per tree depth, accumulated over every reported root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Totals {
    counts: Vec<usize>,
    passes: Vec<usize>,
}

impl Totals {
    pub fn add(&mut self, root: &Test) {
        self.add_level(&[root], 0);
    }

    fn add_level(&mut self, tests: &[&Test], level: usize) {
        if tests.is_empty() {
            return;
        }
        if self.counts.len() <= level {
            self.counts.resize(level + 1, 0);
            self.passes.resize(level + 1, 0);
        }
        self.counts[level] += tests.len();
        self.passes[level] += tests.iter().filter(|t| t.has_passed()).count();

        let children: Vec<Rc<Test>> = tests.iter().flat_map(|t| t.children()).collect();
        let children: Vec<&Test> = children.iter().map(|c| c.as_ref()).collect();
        self.add_level(&children, level + 1);
    }

    /// Total node count at each depth.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Passing node count at each depth.
    pub fn passes(&self) -> &[usize] {
        &self.passes
    }
}

/// Results from reporting one or more test trees. `passed` and `not_run`
/// count leaves; `failed` counts failing leaves plus parents whose own body
/// failed.
#[derive(Debug, Default)]
pub struct RunResult {
    pub passed: usize,
    pub failed: usize,
    pub not_run: usize,
    pub filtered: usize,
    pub failures: Vec<String>,
    pub totals: Totals,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.not_run == 0 && self.failures.is_empty()
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Prints finished trees and accumulates a [`RunResult`].
pub struct Reporter {
    config: RunConfig,
    result: RunResult,
    start: Instant,
}

impl Reporter {
    pub fn new(config: RunConfig) -> Self {
        Reporter {
            config,
            result: RunResult::default(),
            start: Instant::now(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Print `root`'s tree and add it to the totals.
    pub fn report(&mut self, root: &Test) {
        self.result.totals.add(root);
        self.report_node(root, 0, &[]);
    }

    fn report_node(&mut self, test: &Test, depth: usize, path: &[String]) {
        let indent = "  ".repeat(depth);
        let mut path = path.to_vec();
        path.push(test.name().to_string());
        let children = test.children();

        if children.is_empty() {
            if !test.is_complete() {
                self.result.not_run += 1;
            } else if test.has_passed() {
                self.result.passed += 1;
            } else {
                self.result.failed += 1;
            }
        } else if test.error().is_some() {
            // A parent's own body failed; its children are counted on their own.
            self.result.failed += 1;
        }
        if let Some(error) = test.error() {
            self.result
                .failures
                .push(format!("{}: {error}", full_name(&path)));
        }

        let hidden = self.config.hide_passed && test.has_passed();
        if !hidden {
            println!("{indent}{}", caption(test));
            if let Some(source) = failed_source(test) {
                for line in source.lines() {
                    println!("{indent}    {}", dim(line));
                }
            }
        }
        for child in &children {
            if !hidden {
                self.report_node(child, depth + 1, &path);
            } else {
                self.count_hidden(child);
            }
        }
    }

    fn count_hidden(&mut self, test: &Test) {
        let children = test.children();
        if children.is_empty() {
            self.result.passed += 1;
        }
        for child in &children {
            self.count_hidden(child);
        }
    }

    /// Record a top-level declaration skipped by the filter.
    pub fn skip(&mut self, name: &str) {
        tracing::debug!(test = name, "filtered out");
        self.result.filtered += 1;
    }

    /// Print the summary and hand back the accumulated result.
    pub fn finish(self) -> RunResult {
        print_summary(&self.result, self.start.elapsed());
        self.result
    }
}

fn caption(test: &Test) -> String {
    let error = test
        .error()
        .map(|e| format!(" ({e})"))
        .unwrap_or_default();
    if !test.is_complete() {
        format!("{} {}{}", yellow("-"), dim(test.name()), red(&error))
    } else if test.has_passed() {
        format!("{} {}", green("✓"), test.name())
    } else {
        format!("{} {}{}", red("✗"), red(test.name()), red(&error))
    }
}

/// Source text of a failed body, when it was recorded.
fn failed_source(test: &Test) -> Option<&'static str> {
    test.inspect()
        .and_then(|inspection| inspection.source)
        .filter(|source| !source.trim().is_empty())
}

fn print_summary(result: &RunResult, elapsed: Duration) {
    let elapsed_str = format!("{:.3}s", elapsed.as_secs_f64());

    let parts: Vec<String> = [
        (result.passed > 0).then(|| green(&format!("{} passed", result.passed))),
        (result.failed > 0).then(|| red(&format!("{} failed", result.failed))),
        (result.not_run > 0).then(|| yellow(&format!("{} not run", result.not_run))),
        (result.filtered > 0).then(|| dim(&format!("{} filtered", result.filtered))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let levels: Vec<String> = result
        .totals
        .counts()
        .iter()
        .zip(result.totals.passes())
        .map(|(count, passes)| format!("{passes}/{count}"))
        .collect();

    println!();
    if result.success() {
        println!("{}", green("PASS"));
    } else {
        println!("{}", red("FAIL"));
    }
    println!("{} ({})", parts.join(", "), dim(&elapsed_str));
    if !levels.is_empty() {
        println!("{}", dim(&format!("per level: {}", levels.join("  "))));
    }
    if !result.failures.is_empty() {
        println!();
        println!("Failures:");
        for (i, failure) in result.failures.iter().enumerate() {
            println!("  {}. {}", i + 1, failure);
        }
        println!();
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// The top-level declaration surface handed to [`run`]'s body: applies the
/// filter, runs each declared tree to completion and reports it.
pub struct Suite<'a> {
    runner: &'a TestRunner,
    reporter: RefCell<Reporter>,
}

impl<'a> Suite<'a> {
    pub fn new(runner: &'a TestRunner, config: RunConfig) -> Self {
        Suite {
            runner,
            reporter: RefCell::new(Reporter::new(config)),
        }
    }

    /// Declare and run a top-level test. Returns `None` when the filter
    /// excludes it.
    pub fn test<R, F>(&self, name: impl Into<String>, body: F) -> Option<Rc<Test>>
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        let name = name.into();
        if !self.reporter.borrow().config().includes(&name) {
            self.reporter.borrow_mut().skip(&name);
            return None;
        }
        let root = self.runner.test(name, body);
        self.reporter.borrow_mut().report(&root);
        Some(root)
    }

    /// The runner, for registering plugins.
    pub fn runner(&self) -> &'a TestRunner {
        self.runner
    }

    pub fn finish(self) -> RunResult {
        self.reporter.into_inner().finish()
    }
}

/// Run a suite with a fresh [`TestRunner`] and exit with status 1 if anything
/// failed or never ran.
///
/// Call it from `fn main()` in a test target with `harness = false`.
///
/// ```rust,no_run
/// fn main() {
///     basil::run(|suite| {
///         suite.test("Calculator", |ctx| {
///             ctx.test("adds", |_| assert_eq!(2 + 3, 5));
///         });
///     });
/// }
/// ```
pub fn run(body: impl FnOnce(&Suite<'_>)) {
    run_with(TestRunner::new(), body);
}

/// Like [`run`], with a preconfigured runner.
pub fn run_with(runner: TestRunner, body: impl FnOnce(&Suite<'_>)) {
    let suite = Suite::new(&runner, RunConfig::from_args());
    println!();
    body(&suite);
    let result = suite.finish();
    if !result.success() {
        std::process::exit(1);
    }
}

//! Line assignment with minimal redraw.
//!
//! The synchronizer remembers which problem sits on which line and, given a
//! new problem set, emits only the commands needed to get from one to the
//! other. Panel writes are slow compared to polling, so unchanged lines are
//! never touched and the splash is not repainted while it is already up.

#![allow(missing_docs)]

use crate::core::problem::Problem;
use crate::display::driver::LineMask;
use crate::display::severity::{SeverityClassifier, StateStyle};

/// Problem lines on the panel.
pub const MAX_LINES: usize = 6;

/// Device-independent output of [`DisplaySynchronizer::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    /// Nothing to report: splash image and all-clear text.
    ShowSplash,
    /// Wipe the splash before the first problem is drawn.
    ClearAll,
    RenderProblem {
        line: usize,
        problem: Problem,
        style: StateStyle,
    },
    /// Blank lines that no longer hold a problem.
    ClearLines(LineMask),
}

#[derive(Debug, Clone)]
pub struct DisplaySynchronizer {
    classifier: SeverityClassifier,
    previous: Vec<Problem>,
    /// True until the first reconcile after construction or reset, so the
    /// splash is forced once even when nothing was drawn before.
    fresh: bool,
}

impl DisplaySynchronizer {
    #[must_use]
    pub const fn new(classifier: SeverityClassifier) -> Self {
        Self {
            classifier,
            previous: Vec::new(),
            fresh: true,
        }
    }

    /// Problems currently on the panel, line 0 first.
    #[must_use]
    pub fn previous(&self) -> &[Problem] {
        &self.previous
    }

    /// Forget the panel contents; the next reconcile redraws everything.
    pub fn reset(&mut self) {
        self.previous.clear();
        self.fresh = true;
    }

    /// Stable sort by severity, capped at [`MAX_LINES`].
    #[must_use]
    pub fn order(&self, problems: &[Problem]) -> Vec<Problem> {
        let mut ordered = problems.to_vec();
        ordered.sort_by_key(|p| self.classifier.severity_rank(p.state()));
        ordered.truncate(MAX_LINES);
        ordered
    }

    pub fn reconcile(&mut self, problems: &[Problem]) -> Vec<RenderCommand> {
        let was_fresh = std::mem::replace(&mut self.fresh, false);

        if problems.is_empty() {
            if self.previous.is_empty() && !was_fresh {
                return Vec::new();
            }
            self.previous.clear();
            return vec![RenderCommand::ShowSplash];
        }

        let ordered = self.order(problems);
        let mut commands = Vec::with_capacity(ordered.len() + 2);

        if self.previous.is_empty() {
            commands.push(RenderCommand::ClearAll);
        }

        for (line, problem) in ordered.iter().enumerate() {
            if self.previous.get(line) == Some(problem) {
                continue;
            }
            commands.push(RenderCommand::RenderProblem {
                line,
                problem: problem.clone(),
                style: self.classifier.style_for(problem.state()),
            });
        }

        let stale = (ordered.len()..self.previous.len())
            .filter_map(LineMask::for_line)
            .fold(LineMask::NONE, |acc, m| acc | m);
        if !stale.is_empty() {
            commands.push(RenderCommand::ClearLines(stale));
        }

        self.previous = ordered;
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::problem::StateName;
    use crate::display::severity::CriticalClass;
    use proptest::prelude::*;

    fn sync() -> DisplaySynchronizer {
        DisplaySynchronizer::new(SeverityClassifier::default())
    }

    fn p(state: StateName, description: &str) -> Problem {
        Problem::new(state, description)
    }

    fn rendered_lines(commands: &[RenderCommand]) -> Vec<usize> {
        commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::RenderProblem { line, .. } => Some(*line),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_empty_reconcile_forces_splash_once() {
        let mut s = sync();
        assert_eq!(s.reconcile(&[]), vec![RenderCommand::ShowSplash]);
        assert!(s.reconcile(&[]).is_empty());
    }

    #[test]
    fn reset_forces_splash_again() {
        let mut s = sync();
        s.reconcile(&[]);
        s.reset();
        assert_eq!(s.reconcile(&[]), vec![RenderCommand::ShowSplash]);
    }

    #[test]
    fn problems_after_splash_clear_first() {
        let mut s = sync();
        s.reconcile(&[]);
        let cmds = s.reconcile(&[p(StateName::Down, "gw01")]);
        assert_eq!(cmds[0], RenderCommand::ClearAll);
        assert_eq!(rendered_lines(&cmds), vec![0]);
    }

    #[test]
    fn only_changed_lines_are_redrawn() {
        let a = p(StateName::Down, "a");
        let b = p(StateName::Down, "b");
        let c = p(StateName::Down, "c");
        let d = p(StateName::Down, "d");
        let mut s = sync();
        s.reconcile(&[a.clone(), b.clone(), c]);
        let cmds = s.reconcile(&[a, b, d.clone()]);
        assert_eq!(
            cmds,
            vec![RenderCommand::RenderProblem {
                line: 2,
                problem: d,
                style: SeverityClassifier::default().style_for(StateName::Down),
            }]
        );
    }

    #[test]
    fn shrinking_clears_tail_in_one_command() {
        let mut s = sync();
        let set: Vec<Problem> = (0..5)
            .map(|i| p(StateName::Warning, &format!("svc{i}")))
            .collect();
        s.reconcile(&set);
        let cmds = s.reconcile(&set[..2]);
        assert_eq!(
            cmds,
            vec![RenderCommand::ClearLines(
                LineMask::LINE_3 | LineMask::LINE_4 | LineMask::LINE_5
            )]
        );
        assert_eq!(s.previous().len(), 2);
    }

    #[test]
    fn going_empty_shows_splash() {
        let mut s = sync();
        s.reconcile(&[p(StateName::Unknown, "x")]);
        assert_eq!(s.reconcile(&[]), vec![RenderCommand::ShowSplash]);
        assert!(s.previous().is_empty());
        assert!(s.reconcile(&[]).is_empty());
    }

    #[test]
    fn state_change_on_same_host_redraws() {
        let mut s = sync();
        s.reconcile(&[p(StateName::Warning, "db01 disk")]);
        let cmds = s.reconcile(&[p(StateName::Critical, "db01 disk")]);
        assert_eq!(rendered_lines(&cmds), vec![0]);
    }

    #[test]
    fn nine_problems_keep_six_most_severe() {
        let mut s = sync();
        let mut set = Vec::new();
        for i in 0..3 {
            set.push(p(StateName::Up, &format!("up{i}")));
            set.push(p(StateName::Unknown, &format!("unknown{i}")));
            set.push(p(StateName::Down, &format!("down{i}")));
        }
        s.reconcile(&set);
        let shown: Vec<&str> = s.previous().iter().map(Problem::description).collect();
        assert_eq!(
            shown,
            vec!["down0", "down1", "down2", "unknown0", "unknown1", "unknown2"]
        );
    }

    #[test]
    fn critical_class_changes_order() {
        let set = [p(StateName::Down, "gw"), p(StateName::Critical, "svc"), p(StateName::Down, "gw2")];
        let mut warning = sync();
        warning.reconcile(&set);
        let order: Vec<&str> = warning.previous().iter().map(Problem::description).collect();
        assert_eq!(order, vec!["gw", "gw2", "svc"]);

        let mut down = DisplaySynchronizer::new(SeverityClassifier::new(CriticalClass::Down));
        down.reconcile(&set);
        let order: Vec<&str> = down.previous().iter().map(Problem::description).collect();
        assert_eq!(order, vec!["gw", "svc", "gw2"]);
    }

    fn arb_problem() -> impl Strategy<Value = Problem> {
        (0..StateName::ALL.len(), "[a-z]{1,4}")
            .prop_map(|(i, name)| Problem::new(StateName::ALL[i], name))
    }

    proptest! {
        #[test]
        fn reconcile_is_idempotent(problems in prop::collection::vec(arb_problem(), 0..12)) {
            let mut s = sync();
            s.reconcile(&problems);
            prop_assert!(s.reconcile(&problems).is_empty());
        }

        #[test]
        fn rendered_order_is_stable_severity_sort(
            problems in prop::collection::vec(arb_problem(), 0..12),
        ) {
            let classifier = SeverityClassifier::default();
            let mut s = DisplaySynchronizer::new(classifier);
            s.reconcile(&problems);

            let mut expected: Vec<(u8, usize)> = problems
                .iter()
                .enumerate()
                .map(|(i, p)| (classifier.severity_rank(p.state()), i))
                .collect();
            expected.sort_unstable();
            let expected: Vec<&Problem> =
                expected.iter().take(MAX_LINES).map(|(_, i)| &problems[*i]).collect();
            let actual: Vec<&Problem> = s.previous().iter().collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn transitions_stay_within_line_bounds(
            first in prop::collection::vec(arb_problem(), 0..12),
            second in prop::collection::vec(arb_problem(), 0..12),
        ) {
            let mut s = sync();
            s.reconcile(&first);
            let cmds = s.reconcile(&second);
            prop_assert!(s.previous().len() <= MAX_LINES);
            prop_assert!(s.previous().len() <= second.len());
            let mut seen = LineMask::NONE;
            for cmd in &cmds {
                match cmd {
                    RenderCommand::RenderProblem { line, problem, .. } => {
                        prop_assert!(*line < MAX_LINES);
                        prop_assert_eq!(&s.previous()[*line], problem);
                        let mask = LineMask::for_line(*line).unwrap();
                        prop_assert!(!seen.contains(mask), "line {} drawn twice", line);
                        seen |= mask;
                    }
                    RenderCommand::ClearLines(mask) => {
                        prop_assert!(mask.lines().all(|l| l >= s.previous().len()));
                    }
                    RenderCommand::ShowSplash => prop_assert!(second.is_empty()),
                    RenderCommand::ClearAll => {}
                }
            }
        }
    }
}

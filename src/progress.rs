use std::sync::Mutex;

const EXTRACTION_WEIGHT: f64 = 0.8;
const SIGNING_WEIGHT: f64 = 0.2;

struct ProgressState {
    extraction: f64,
    signing: f64,
    reported: f64,
    finished: bool,
}

/// Aggregates the pipeline's two weighted sub-progresses (extraction 80%,
/// signing 20%) into a single monotonically non-decreasing value in [0, 1].
/// `finish` forces the terminal 1.0 so observers never get stuck mid-way.
pub struct InstallProgress<'a> {
    state: Mutex<ProgressState>,
    handler: &'a dyn Fn(f64),
}

impl<'a> InstallProgress<'a> {
    pub fn new(handler: &'a dyn Fn(f64)) -> Self {
        let progress = Self {
            state: Mutex::new(ProgressState {
                extraction: 0.0,
                signing: 0.0,
                reported: 0.0,
                finished: false,
            }),
            handler,
        };
        (progress.handler)(0.0);
        progress
    }

    pub fn extraction(&self, fraction: f64) {
        self.update(fraction, None);
    }

    pub fn signing(&self, fraction: f64) {
        self.update(fraction, Some(()));
    }

    fn update(&self, fraction: f64, signing: Option<()>) {
        let value = {
            let mut state = self.state.lock().unwrap();
            if state.finished {
                return;
            }
            let fraction = fraction.clamp(0.0, 1.0);
            match signing {
                None => state.extraction = state.extraction.max(fraction),
                Some(()) => state.signing = state.signing.max(fraction),
            }
            let total = EXTRACTION_WEIGHT * state.extraction + SIGNING_WEIGHT * state.signing;
            state.reported = state.reported.max(total);
            state.reported
        };
        (self.handler)(value);
    }

    pub fn finish(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.finished {
                return;
            }
            state.finished = true;
        }
        (self.handler)(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn collect(run: impl Fn(&InstallProgress)) -> Vec<f64> {
        let seen = RefCell::new(Vec::new());
        let handler = |v: f64| seen.borrow_mut().push(v);
        let progress = InstallProgress::new(&handler);
        run(&progress);
        progress.finish();
        seen.into_inner()
    }

    #[test]
    fn extraction_is_weighted_at_80_percent() {
        let seen = collect(|p| {
            p.extraction(0.5);
            p.extraction(1.0);
        });
        assert!(seen.contains(&0.4));
        assert!(seen.contains(&0.8));
    }

    #[test]
    fn signing_contributes_the_remaining_20_percent() {
        let seen = collect(|p| {
            p.extraction(1.0);
            p.signing(0.5);
            p.signing(1.0);
        });
        assert!(seen.contains(&0.9));
        assert!(seen.contains(&1.0));
    }

    #[test]
    fn values_never_decrease() {
        let seen = collect(|p| {
            p.extraction(0.9);
            p.extraction(0.2);
            p.signing(1.0);
            p.signing(0.1);
        });
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn finish_always_lands_on_one() {
        let seen = collect(|p| p.extraction(0.3));
        assert_eq!(seen.last().copied(), Some(1.0));

        // finish with no sub-progress at all
        let seen = collect(|_| {});
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn no_updates_after_finish() {
        let seen = RefCell::new(Vec::new());
        let handler = |v: f64| seen.borrow_mut().push(v);
        let progress = InstallProgress::new(&handler);
        progress.finish();
        progress.extraction(0.5);
        progress.finish();
        assert_eq!(*seen.borrow(), vec![0.0, 1.0]);
    }
}

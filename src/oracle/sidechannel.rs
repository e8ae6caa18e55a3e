//! Side-channel specialization of the generic [`Oracle`] (Component D).

use std::cell::RefCell;
use std::rc::Rc;

use crate::log::log_info_once;

use super::Oracle;

/// Standard analysis: the index of the smallest strictly-positive element,
/// or `-1` if every element is zero.
pub fn find_best_hit(data: &[u64]) -> i64 {
    let mut best: Option<(usize, u64)> = None;
    for (i, &v) in data.iter().enumerate() {
        let better = match best {
            Some((_, b)) => v < b,
            None => true,
        };
        if v > 0 && better {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i as i64).unwrap_or(-1)
}

/// An [`Oracle`] whose query implementation runs a trigger/wait/analyze
/// cycle against a shared measurement vector.
///
/// `trigger`, `wait`, and `analyze` are ordinary `FnMut` closures rather
/// than a function-pointer-plus-context pair, per the "capability record"
/// design note — whatever context they need, they close over.
pub struct SidechannelOracle {
    trigger: Box<dyn FnMut(u64)>,
    wait: Option<Box<dyn FnMut() -> bool>>,
    analyze: Option<Box<dyn FnMut(&[u64]) -> i64>>,
    measurements: Rc<RefCell<Vec<u64>>>,
}

impl SidechannelOracle {
    /// Builds a side-channel oracle over a shared measurement buffer.
    /// `trigger` is expected to write into (a clone of) this same buffer.
    pub fn new(measurements: Rc<RefCell<Vec<u64>>>, trigger: impl FnMut(u64) + 'static) -> Self {
        SidechannelOracle {
            trigger: Box::new(trigger),
            wait: None,
            analyze: None,
            measurements,
        }
    }

    pub fn with_wait(mut self, wait: impl FnMut() -> bool + 'static) -> Self {
        self.wait = Some(Box::new(wait));
        self
    }

    pub fn with_analyze(mut self, analyze: impl FnMut(&[u64]) -> i64 + 'static) -> Self {
        self.analyze = Some(Box::new(analyze));
        self
    }
}

impl Oracle for SidechannelOracle {
    fn query(&mut self, input: u64) -> i64 {
        (self.trigger)(input);

        if let Some(wait) = self.wait.as_mut() {
            if !wait() {
                return -1;
            }
        }

        let data = self.measurements.borrow();
        match self.analyze.as_mut() {
            Some(analyze) => analyze(&data),
            None => {
                log_info_once!("No analyze closure supplied; using the default find_best_hit heuristic");
                find_best_hit(&data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_best_hit_picks_smallest_positive() {
        let data = [200u64, 200, 50, 200];
        assert_eq!(find_best_hit(&data), 2);
    }

    #[test]
    fn find_best_hit_all_zero_is_no_hit() {
        let data = [0u64, 0, 0];
        assert_eq!(find_best_hit(&data), -1);
    }

    #[test]
    fn layered_query_uses_mocked_trigger() {
        let measurements = Rc::new(RefCell::new(vec![200u64; 256]));
        let target_hit = Rc::new(RefCell::new(137usize));

        let m = measurements.clone();
        let t = target_hit.clone();
        let mut oracle = SidechannelOracle::new(measurements.clone(), move |_input| {
            let mut data = m.borrow_mut();
            data.iter_mut().for_each(|x| *x = 200);
            data[*t.borrow()] = 50;
        })
        .with_wait(|| true);

        let result = oracle.query(0);
        assert_eq!(result, 137);
    }
}

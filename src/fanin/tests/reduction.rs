use fanin::local::run_group;
use fanin::report;

#[test]
fn closed_form_holds_for_small_groups() {
    logging::init_log();

    for group in 1..=16 {
        let contributions: Vec<f64> = (0..group).map(|rank| rank as f64).collect();
        let total = run_group(&contributions).unwrap();
        assert_eq!(total, report::rank_sum(group), "group of {}", group);
    }
}

#[test]
fn singleton_group_is_its_own_aggregate() {
    assert_eq!(run_group(&[0.0]).unwrap(), 0.0);
    assert_eq!(run_group(&[42.5]).unwrap(), 42.5);
}

#[test]
fn five_participants_sum_to_ten() {
    assert_eq!(run_group(&[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap(), 10.0);
}

// All values here are small binary fractions, so every intermediate sum is
// exact and the assertion does not depend on fold order.
#[test]
fn relabeling_ranks_keeps_the_aggregate() {
    let base = [3.5, -1.0, 7.25, 0.0, 12.0, 5.5, -2.25];
    let expected: f64 = base.iter().sum();

    for shift in 0..base.len() {
        let rotated: Vec<f64> = (0..base.len())
            .map(|rank| base[(rank + shift) % base.len()])
            .collect();
        assert_eq!(run_group(&rotated).unwrap(), expected, "shift {}", shift);
    }
}

#[test]
fn awkward_group_sizes_still_drain_completely() {
    for &group in &[3usize, 5, 6, 7, 9, 11, 13] {
        let contributions: Vec<f64> = (0..group).map(|rank| rank as f64).collect();
        let total = run_group(&contributions).unwrap();
        assert_eq!(total, report::rank_sum(group), "group of {}", group);
    }
}

use dashcore::layout::{
    align_group, is_collision_free, place, translate_group, Alignment, GridBox, GridLayout,
    GRID_COLUMNS, MAX_GRID_ROWS,
};
use dashcore::LayoutError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn fill(seed: u64, count: usize) -> Vec<GridBox> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut boxes = Vec::new();
    for _ in 0..count {
        let w = rng.gen_range(-3..=16);
        let h = rng.gen_range(-2..=6);
        let requested = if rng.gen_bool(0.5) {
            Some((rng.gen_range(-5..=20), rng.gen_range(-5..=20)))
        } else {
            None
        };
        let placed = place(&boxes, w, h, requested);
        boxes.push(placed);
    }
    boxes
}

#[test]
fn test_random_sequences_stay_collision_free_and_in_bounds() {
    for seed in 1..=25 {
        let boxes = fill(seed, 40);
        assert!(is_collision_free(&boxes), "seed {} produced an overlap", seed);
        for b in &boxes {
            assert!(b.in_bounds(), "seed {} produced {:?}", seed, b);
            assert!(b.x + b.w <= GRID_COLUMNS);
        }
    }
}

#[test]
fn test_placement_is_deterministic() {
    assert_eq!(fill(7, 30), fill(7, 30));
}

#[test]
fn test_requested_position_honored_when_free() {
    let existing = vec![GridBox::new(0, 0, 6, 4)];
    assert_eq!(place(&existing, 6, 4, Some((6, 0))), GridBox::new(6, 0, 6, 4));
    // Occupied request falls back to the first free slot.
    assert_eq!(place(&existing, 6, 4, Some((3, 1))), GridBox::new(6, 0, 6, 4));
    // A request that does not fit the row is not shifted; it is scanned instead.
    assert_eq!(place(&[], 4, 2, Some((10, 5))), GridBox::new(0, 0, 4, 2));
}

#[test]
fn test_full_width_box_goes_below() {
    let existing = vec![GridBox::new(0, 0, 4, 2), GridBox::new(8, 1, 4, 3)];
    assert_eq!(place(&existing, 12, 1, None), GridBox::new(0, 4, 12, 1));
}

#[test]
fn test_settle_keeps_free_boxes_and_repositions_colliding_ones() {
    let layout = GridLayout::default();
    let others = vec![GridBox::new(0, 0, 6, 2)];
    assert_eq!(layout.settle(&others, 20, 3, 5, 2), GridBox::new(7, 3, 5, 2));
    let moved = layout.settle(&others, 2, 0, 4, 2);
    assert_eq!(moved, GridBox::new(6, 0, 4, 2));
    assert!(is_collision_free(&[others[0], moved]));
}

#[test]
fn test_huge_positions_and_heights_are_clamped_to_the_grid() {
    let layout = GridLayout::default();

    let tall = layout.settle(&[], 0, 5, 4, i64::MAX);
    assert_eq!(tall, GridBox::new(0, 0, 4, MAX_GRID_ROWS));
    let next = layout.place(&[tall], 4, 1, None);
    assert_eq!(next, GridBox::new(4, 0, 4, 1));

    let low = layout.settle(&[], 0, i64::MAX, 4, 3);
    assert_eq!(low, GridBox::new(0, MAX_GRID_ROWS - 3, 4, 3));
    assert_eq!(low.bottom(), MAX_GRID_ROWS);
    let next = layout.place(&[low], 12, 1, None);
    assert_eq!(next, GridBox::new(0, 0, 12, 1));

    for b in [tall, low] {
        assert!(b.in_bounds(), "{:?}", b);
    }
    assert!(!GridBox::new(0, u32::MAX, 4, 3).in_bounds());
    assert!(!GridBox::new(0, u32::MAX, 4, 3).overlaps(&GridBox::new(0, 0, 4, 3)));

    let requested = place(&[], 4, 3, Some((0, i64::MAX)));
    assert_eq!(requested, GridBox::new(0, 0, 4, 3));
    assert!(matches!(
        translate_group(&[GridBox::new(0, 0, 2, 2)], 0, i64::MAX, &[]),
        Err(LayoutError::OutOfBounds { .. })
    ));
}

#[test]
fn test_group_moves_are_all_or_nothing() {
    let group = vec![GridBox::new(0, 0, 2, 2), GridBox::new(2, 0, 2, 2)];
    let fixed = vec![GridBox::new(0, 4, 12, 1)];

    let moved = translate_group(&group, 1, 1, &fixed).unwrap();
    assert_eq!(moved, vec![GridBox::new(1, 1, 2, 2), GridBox::new(3, 1, 2, 2)]);

    assert!(matches!(
        translate_group(&group, 0, 3, &fixed),
        Err(LayoutError::Overlap { .. })
    ));
    assert!(matches!(
        translate_group(&group, 9, 0, &fixed),
        Err(LayoutError::OutOfBounds { .. })
    ));

    let staggered = vec![GridBox::new(0, 0, 2, 2), GridBox::new(4, 2, 2, 2)];
    assert_eq!(
        align_group(&staggered, Alignment::Top, &fixed).unwrap(),
        vec![GridBox::new(0, 0, 2, 2), GridBox::new(4, 0, 2, 2)]
    );
    // Right-aligning side-by-side boxes stacks them into the same columns.
    assert!(align_group(&moved, Alignment::Right, &fixed).is_err());
}

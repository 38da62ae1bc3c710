use approx::assert_abs_diff_eq;
use stereorec_algorithms::{EventOutcome, EventProcessor, LookupTable, TableLayout, TableSet, TableTarget};
use stereorec_core::{
    CutReason, EnergyQuality, EventInput, FillCuts, ImageParameters, McTruth, PerTelescope,
    Pointing, Position, ProcessingMode, RunConfig, Telescope, TelescopeArray, TelescopeId,
    TelescopeType, UpstreamReconstruction,
};

const TYPE: TelescopeType = TelescopeType(3);

#[test]
fn test_fill_then_read_round_trip() {
    for target in TableTarget::ALL {
        let mut table = LookupTable::new(target, TableLayout::default());
        for _ in 0..25 {
            assert!(table.fill(TYPE, 30.0, 5.0, 1.0e4, 100.0, 1.0, 1.0));
        }
        let value = table.lookup(TYPE, 30.0, 5.0, 1.0e4, 100.0, 5).unwrap();
        assert_abs_diff_eq!(value.value, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(value.sigma, 0.0, epsilon = 1e-9);
    }
}

#[test]
fn test_empty_slice_falls_back_to_filled_one() {
    let mut table = LookupTable::new(TableTarget::Width, TableLayout::default());
    for _ in 0..25 {
        table.fill(TYPE, 30.0, 5.0, 1.0e4, 100.0, 1.0, 1.0);
    }
    let value = table.lookup(TYPE, 85.0, 20.0, 1.0e4, 100.0, 5).unwrap();
    assert_abs_diff_eq!(value.value, 1.0, epsilon = 1e-9);

    // a type never filled gets no value at all
    assert!(table.lookup(TelescopeType(99), 30.0, 5.0, 1.0e4, 100.0, 5).is_none());
}

fn array() -> TelescopeArray {
    array_of_types(TYPE, TYPE)
}

fn array_of_types(first: TelescopeType, second: TelescopeType) -> TelescopeArray {
    TelescopeArray::new(vec![
        Telescope::new(Position::new(0.0, 0.0, 0.0), 12.0, 3.5, first),
        Telescope::new(Position::new(100.0, 0.0, 0.0), 12.0, 3.5, second),
    ])
    .unwrap()
}

fn filled_tables(array: &TelescopeArray) -> TableSet {
    let config = RunConfig::default()
        .with_mode(ProcessingMode::Fill)
        .with_fill_cuts(FillCuts {
            max_true_offset: 1.0,
            ..FillCuts::default()
        });
    let mut filler =
        EventProcessor::new(array, &config, TableSet::new(&TableLayout::default())).unwrap();
    for n in 0..10 {
        let width = if n % 2 == 0 { 0.04 } else { 0.06 };
        filler.process(&simulated_event(n, width, 0.5)).unwrap();
    }
    filler.finish().1
}

fn simulated_event(number: u64, width: f64, true_offset: f64) -> EventInput {
    let mut images = PerTelescope::new(2);
    images
        .set(TelescopeId(0), ImageParameters::new(0.5, 0.5, width, 0.2, 45.0, 5000.0))
        .unwrap();
    images
        .set(TelescopeId(1), ImageParameters::new(-0.5, 0.5, width, 0.2, 135.0, 5000.0))
        .unwrap();
    EventInput {
        run_number: 7,
        event_number: number,
        time: 0.0,
        pointing: Pointing::zenith(),
        field_rotation: 0.0,
        trigger: vec![TelescopeId(0), TelescopeId(1)],
        images,
        reconstructions: vec![UpstreamReconstruction {
            n_images: 2,
            chi2: Some(0.1),
            xoff: Some(0.0),
            yoff: Some(0.0),
            xcore: Some(50.0),
            ycore: Some(50.0),
            selected: vec![TelescopeId(0), TelescopeId(1)],
        }],
        mc: Some(McTruth {
            energy: 2.0,
            xcore: 50.0,
            ycore: 50.0,
            xoff: true_offset,
            yoff: 0.0,
            xmax_height: None,
        }),
    }
}

#[test]
fn test_processor_fills_and_reads_tables() {
    let array = array();
    let layout = TableLayout::default();

    let fill_config = RunConfig::default()
        .with_mode(ProcessingMode::Fill)
        .with_fill_cuts(FillCuts {
            max_true_offset: 1.0,
            ..FillCuts::default()
        });
    let mut filler = EventProcessor::new(&array, &fill_config, TableSet::new(&layout)).unwrap();
    for n in 0..10 {
        let width = if n % 2 == 0 { 0.04 } else { 0.06 };
        let outcome = filler.process(&simulated_event(n, width, 0.5)).unwrap();
        assert!(matches!(outcome, EventOutcome::Accepted(_)), "{outcome:?}");
    }
    assert_eq!(
        filler.process(&simulated_event(10, 0.05, 2.0)).unwrap(),
        EventOutcome::Rejected(CutReason::TrueOffsetRange)
    );
    let (summary, tables) = filler.finish();
    assert_eq!(summary.cuts.survived, 10);
    assert!(tables.missing_types(&array).is_empty());

    let read_config = RunConfig::default();
    let mut reader = EventProcessor::new(&array, &read_config, tables).unwrap();
    let mut input = simulated_event(20, 0.06, 0.5);
    input.mc = None;
    let EventOutcome::Accepted(record) = reader.process(&input).unwrap() else {
        panic!("event should be accepted in read mode");
    };
    assert_abs_diff_eq!(record.scaled.mscw.unwrap(), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(record.scaled.mwr.unwrap(), 1.2, epsilon = 1e-6);
    // every filled length is identical, so the spread is zero and MSCL undefined
    assert!(record.scaled.mscl.is_none());
    assert_abs_diff_eq!(record.scaled.mlr.unwrap(), 1.0, epsilon = 1e-6);
    let energy = record.energy.unwrap();
    assert_abs_diff_eq!(energy.energy.unwrap(), 2.0, epsilon = 1e-6);
    assert_eq!(energy.quality, EnergyQuality::Full);
    assert_eq!(energy.n_contributing, 2);
}

#[test]
fn test_fill_cuts_drop_edge_images() {
    let array = array();
    let config = RunConfig::default().with_mode(ProcessingMode::Fill);
    let mut filler = EventProcessor::new(&array, &config, TableSet::new(&TableLayout::default())).unwrap();
    let mut input = simulated_event(1, 0.05, 0.5);
    let mut edge = *input.images.get(TelescopeId(1)).unwrap();
    edge.loss = 0.5;
    input.images.set(TelescopeId(1), edge).unwrap();
    assert_eq!(
        filler.process(&input).unwrap(),
        EventOutcome::Rejected(CutReason::ImageSelection)
    );
}

#[test]
fn test_type_without_tables_drops_its_contribution() {
    let tables = filled_tables(&array());
    let mixed = array_of_types(TYPE, TelescopeType(4));
    assert_eq!(tables.missing_types(&mixed), vec![TelescopeType(4)]);

    let config = RunConfig::default();
    let mut reader = EventProcessor::new(&mixed, &config, tables).unwrap();
    let mut input = simulated_event(30, 0.06, 0.5);
    input.mc = None;
    let EventOutcome::Accepted(record) = reader.process(&input).unwrap() else {
        panic!("event should be accepted in read mode");
    };
    let covered = record.images.get(TelescopeId(0)).unwrap();
    let uncovered = record.images.get(TelescopeId(1)).unwrap();
    assert!(covered.width.is_some());
    assert!(uncovered.width.is_none());
    assert!(uncovered.energy.is_none());

    assert_abs_diff_eq!(record.scaled.mscw.unwrap(), 1.0, epsilon = 1e-6);
    let energy = record.energy.unwrap();
    assert_abs_diff_eq!(energy.energy.unwrap(), 2.0, epsilon = 1e-6);
    assert_eq!(energy.n_contributing, 1);
    assert_eq!(energy.quality, EnergyQuality::Partial);
}

#[test]
fn test_fill_cuts_drop_images_far_from_camera_center() {
    let array = array();
    let config = RunConfig::default().with_mode(ProcessingMode::Fill);
    let mut filler = EventProcessor::new(&array, &config, TableSet::new(&TableLayout::default())).unwrap();

    // camera radius 1.75 deg, cut at 0.8 of it
    let mut input = simulated_event(1, 0.05, 0.5);
    input
        .images
        .set(TelescopeId(1), ImageParameters::new(-1.2, 0.8, 0.05, 0.2, 135.0, 5000.0))
        .unwrap();
    assert_eq!(
        filler.process(&input).unwrap(),
        EventOutcome::Rejected(CutReason::ImageSelection)
    );

    let mut inside = simulated_event(2, 0.05, 0.5);
    inside
        .images
        .set(TelescopeId(1), ImageParameters::new(-1.0, 0.8, 0.05, 0.2, 135.0, 5000.0))
        .unwrap();
    assert!(matches!(filler.process(&inside).unwrap(), EventOutcome::Accepted(_)));
}

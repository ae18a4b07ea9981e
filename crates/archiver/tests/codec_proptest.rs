//! Property tests for the sample codec and time rounding.
//!
//! Float values are kept finite so decoded samples compare equal.

use alopex_archiver::codec::{Severity, ValueData};
use alopex_archiver::{DbrType, EpicsTime, Sample};
use proptest::prelude::*;

fn data_strategy() -> impl Strategy<Value = ValueData> {
    let n = 1usize..8;
    prop_oneof![
        prop::collection::vec("[a-zA-Z0-9 :._-]{0,39}", n.clone()).prop_map(ValueData::String),
        prop::collection::vec(any::<i16>(), n.clone()).prop_map(ValueData::Short),
        prop::collection::vec(-1.0e6f32..1.0e6, n.clone()).prop_map(ValueData::Float),
        prop::collection::vec(any::<u16>(), n.clone()).prop_map(ValueData::Enum),
        prop::collection::vec(any::<u8>(), n.clone()).prop_map(ValueData::Char),
        prop::collection::vec(any::<i32>(), n.clone()).prop_map(ValueData::Long),
        prop::collection::vec(-1.0e12f64..1.0e12, n).prop_map(ValueData::Double),
    ]
}

fn sample_strategy() -> impl Strategy<Value = Sample> {
    (any::<u16>(), 0u16..4, 1u32..u32::MAX, 0u32..1_000_000_000, data_strategy()).prop_map(
        |(status, severity, secs, nanos, data)| Sample {
            status,
            severity: Severity(severity),
            time: EpicsTime::new(secs, nanos),
            data,
        },
    )
}

proptest! {
    /// Decoding the wire form gives back the sample, and the wire form has
    /// the fixed size of its shape.
    #[test]
    fn test_sample_roundtrip_proptest(sample in sample_strategy()) {
        let bytes = sample.encode();
        prop_assert_eq!(bytes.len(), sample.dbr_type().raw_size(sample.count()));
        prop_assert_eq!(bytes.len() % 8, 0);

        let decoded = Sample::decode(&bytes, sample.dbr_type(), sample.count()).unwrap();
        prop_assert_eq!(decoded, sample);
    }

    /// A buffer cut short is refused, never read past.
    #[test]
    fn test_short_input_is_invalid_proptest(sample in sample_strategy(), cut in 1usize..8) {
        let bytes = sample.encode();
        let short = &bytes[..bytes.len() - cut];
        let err = Sample::decode(short, sample.dbr_type(), sample.count()).unwrap_err();
        prop_assert!(err.is_invalid());
    }

    /// round_down <= t < round_up, both on the grid.
    #[test]
    fn test_time_rounding_brackets_proptest(
        secs in 1_000u32..2_000_000_000,
        nanos in 0u32..1_000_000_000,
        step in prop::sample::select(vec![1.0, 2.0, 10.0, 60.0, 3600.0, 86400.0]),
    ) {
        let t = EpicsTime::new(secs, nanos);
        let down = t.round_down(step);
        let up = t.round_up(step);
        prop_assert!(down <= t);
        prop_assert!(up > t);
        prop_assert_eq!(down.nanos(), 0);
        prop_assert_eq!(up.nanos(), 0);
        prop_assert_eq!(down.secs() as f64 % step, 0.0);
        prop_assert_eq!(up.secs() as f64 % step, 0.0);
        prop_assert!(up.diff_secs(down) <= step);

        let nearest = t.round(step);
        prop_assert!(nearest == down || nearest == up);
    }
}

#[test]
fn test_dbr_type_codes_roundtrip() {
    for code in 0..32u16 {
        match DbrType::from_u16(code) {
            Some(dbr_type) => assert_eq!(dbr_type.as_u16(), code),
            None => assert!(!(14..=20).contains(&code)),
        }
    }
}

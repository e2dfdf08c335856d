//! Property tests: serialize/parse round-trips for the object model and
//! encrypt/decrypt round-trips for the security handler.

use pdf_mill::crypto::{
    DataClass, StandardSecurityHandler, compute_encryption_key, compute_owner_value,
    compute_user_value,
};
use pdf_mill::writer::serialize_to_vec;
use pdf_mill::{
    Context, Dictionary, Object, ObjectRef, ParseOptions, StrictRecovery, StringFormat,
};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use std::sync::Arc;

fn parse_back(bytes: &[u8]) -> Object {
    let mut scanner = pdf_mill::scanner::Scanner::new(
        bytes,
        ParseOptions::default(),
        Arc::new(StrictRecovery),
    );
    pdf_mill::parser::parse_value(&Context::background(), &mut scanner, 0)
        .expect("serialized object must parse")
}

/// Names: arbitrary ASCII-ish keys, including characters needing `#`
/// escapes.
fn arb_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9 #/()<>.+-]{0,12}").expect("valid regex")
}

fn arb_leaf() -> impl Strategy<Value = Object> {
    prop_oneof![
        Just(Object::Null),
        any::<bool>().prop_map(Object::Boolean),
        any::<i64>().prop_map(Object::Integer),
        // Finite reals; Display prints them exactly and without exponent.
        (-1.0e12f64..1.0e12).prop_map(Object::Real),
        vec(any::<u8>(), 0..32).prop_map(|b| Object::String(b, StringFormat::Literal)),
        vec(any::<u8>(), 0..32).prop_map(|b| Object::String(b, StringFormat::Hex)),
        arb_name().prop_map(Object::Name),
        (1u32..10_000, 0u16..10).prop_map(|(num, gen)| {
            Object::Reference(ObjectRef::new(num, gen))
        }),
    ]
}

fn arb_object() -> impl Strategy<Value = Object> {
    arb_leaf().prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..6).prop_map(Object::Array),
            btree_map(arb_name(), inner, 0..6).prop_map(|entries| {
                Object::Dictionary(entries.into_iter().collect::<Dictionary>())
            }),
        ]
    })
}

proptest! {
    #[test]
    fn prop_object_round_trip(obj in arb_object()) {
        let bytes = serialize_to_vec(&obj);
        prop_assert_eq!(parse_back(&bytes), obj);
    }

    #[test]
    fn prop_name_round_trip(name in arb_name()) {
        let obj = Object::Name(name);
        let bytes = serialize_to_vec(&obj);
        prop_assert_eq!(parse_back(&bytes), obj);
    }

    #[test]
    fn prop_string_bytes_survive(data in vec(any::<u8>(), 0..128)) {
        let literal = Object::String(data.clone(), StringFormat::Literal);
        prop_assert_eq!(parse_back(&serialize_to_vec(&literal)), literal);

        let hex = Object::String(data, StringFormat::Hex);
        prop_assert_eq!(parse_back(&serialize_to_vec(&hex)), hex);
    }
}

fn rc4_handler() -> StandardSecurityHandler {
    let o = compute_owner_value(b"owner", b"user", 2, 5);
    let key = compute_encryption_key(b"user", &o, -4, b"id", 2, 5, true);
    let u = compute_user_value(&key, b"id", 2);

    let mut dict = Dictionary::new();
    dict.insert("Filter".to_string(), Object::name("Standard"));
    dict.insert("V".to_string(), Object::Integer(1));
    dict.insert("R".to_string(), Object::Integer(2));
    dict.insert("O".to_string(), Object::string(o));
    dict.insert("U".to_string(), Object::string(u));
    dict.insert("P".to_string(), Object::Integer(-4));

    let mut handler = StandardSecurityHandler::new(&dict, b"id".to_vec()).unwrap();
    handler.authenticate(&Context::background(), b"user").unwrap();
    handler
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_rc4_encrypt_decrypt(
        data in vec(any::<u8>(), 0..256),
        num in 1u32..5000,
        gen in 0u16..3,
    ) {
        let handler = rc4_handler();
        let r = ObjectRef::new(num, gen);
        let ct = handler.encrypt(DataClass::Stream, r, &data).unwrap();
        prop_assert_eq!(handler.decrypt(DataClass::Stream, r, &ct).unwrap(), data);
    }
}

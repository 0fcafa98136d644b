use redux_core::header::{Header, HeaderValue};

#[test]
fn test_keys_are_case_insensitive() {
    let header = Header::new().with("imtype", "BIAS");
    assert!(header.contains("IMTYPE"));
    assert_eq!(header.get_string("ImType").as_deref(), Some("BIAS"));
}

#[test]
fn test_numeric_text_parses() {
    let header = Header::new().with("TTIME", "300.0").with("NUMOPEN", "2");
    assert_eq!(header.get_f64("TTIME"), Some(300.0));
    assert_eq!(header.get("NUMOPEN").and_then(HeaderValue::as_i64), Some(2));
}

#[test]
fn test_fits_logicals() {
    let header = Header::new()
        .with("A", "T")
        .with("B", "F")
        .with("C", 1)
        .with("D", true)
        .with("E", "maybe");
    assert_eq!(header.get_bool("A"), Some(true));
    assert_eq!(header.get_bool("B"), Some(false));
    assert_eq!(header.get_bool("C"), Some(true));
    assert_eq!(header.get_bool("D"), Some(true));
    assert_eq!(header.get_bool("E"), None);
}

#[test]
fn test_integral_float_reads_as_int() {
    assert_eq!(HeaderValue::Float(3.0).as_i64(), Some(3));
    assert_eq!(HeaderValue::Float(3.5).as_i64(), None);
}

#[test]
fn test_insert_overwrites() {
    let mut header = Header::new().with("GEOMCOR", false);
    header.insert("geomcor", true);
    assert_eq!(header.len(), 1);
    assert_eq!(header.get_bool("GEOMCOR"), Some(true));
}

#[test]
fn test_toml_header_values() {
    let header: Header = toml::from_str(
        r#"
        IMTYPE = "OBJECT"
        TTIME = 120.5
        NUMOPEN = 2
        NASMASK = true
        "#,
    )
    .unwrap();
    assert_eq!(header.get("IMTYPE"), Some(&HeaderValue::Text("OBJECT".into())));
    assert_eq!(header.get("TTIME"), Some(&HeaderValue::Float(120.5)));
    assert_eq!(header.get("NUMOPEN"), Some(&HeaderValue::Int(2)));
    assert_eq!(header.get("NASMASK"), Some(&HeaderValue::Bool(true)));
}

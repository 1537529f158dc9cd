use pretty_assertions::assert_eq;

use pulse_engine::{decode_page, ExtractError, ExtractRules, FragmentExtractor, OverviewExtractor, RawPage};

fn html_page(html: &str) -> RawPage {
    RawPage {
        url: "https://research.example/stock/acme".to_string(),
        bytes: html.as_bytes().to_vec(),
        content_type: Some("text/html; charset=utf-8".to_string()),
    }
}

#[test]
fn overview_sections_are_harvested_in_document_order() {
    let html = r#"
    <html><body>
        <h1 class="name_left">Acme Industries Ltd</h1>
        <div class="kbyistrengths">Consistent cash flows</div>
        <div class="oview_table">Performance</div>
        <div class="oview_table">beat the index twice</div>
        <div class="oview_table">Valuation</div>
        <div class="oview_table">trading above book</div>
    </body></html>
    "#;

    let extractor = OverviewExtractor::default();
    let fragments = extractor.extract(&html_page(html)).unwrap();

    assert_eq!(
        fragments,
        vec![
            "Acme Industries Ltd",
            "Consistent cash flows",
            "Performance",
            "Performance 1): beat the index twice",
            "Valuation",
            "Valuation 1): trading above book",
        ]
    );
}

#[test]
fn absent_sections_are_skipped_not_errors() {
    let html = r#"
    <html><body>
        <h1 class="name_left">Acme Industries Ltd</h1>
    </body></html>
    "#;

    let extractor = OverviewExtractor::default();
    let fragments = extractor.extract(&html_page(html)).unwrap();

    assert_eq!(fragments, vec!["Acme Industries Ltd"]);
}

#[test]
fn page_without_any_known_section_yields_no_fragments() {
    let html = "<html><body><p>nothing recognizable</p></body></html>";

    let extractor = OverviewExtractor::default();
    let fragments = extractor.extract(&html_page(html)).unwrap();

    assert!(fragments.is_empty());
}

#[test]
fn embedded_markup_newlines_are_flattened() {
    let html = r#"
    <html><body>
        <h1 class="name_left">
            Acme
            Industries
        </h1>
    </body></html>
    "#;

    let extractor = OverviewExtractor::default();
    let fragments = extractor.extract(&html_page(html)).unwrap();

    assert_eq!(fragments, vec!["Acme Industries"]);
}

#[test]
fn invalid_selector_in_rules_is_reported() {
    let rules = ExtractRules {
        title: "[unclosed".to_string(),
        ..ExtractRules::default()
    };
    let extractor = OverviewExtractor::new(rules);

    let err = extractor
        .extract(&html_page("<html><body></body></html>"))
        .unwrap_err();
    assert!(matches!(err, ExtractError::Selector(_)));
}

#[test]
fn decode_respects_charset_header() {
    let bytes = b"caf\xe9"; // iso-8859-1
    let decoded = decode_page(bytes, Some("text/html; charset=ISO-8859-1")).unwrap();
    assert_eq!(decoded.text, "café");
    assert!(
        decoded.encoding_label.eq_ignore_ascii_case("ISO-8859-1")
            || decoded.encoding_label.eq_ignore_ascii_case("windows-1252")
    );
}

#[test]
fn decode_handles_utf8_bom() {
    let bytes = b"\xEF\xBB\xBFhello";
    let decoded = decode_page(bytes, Some("text/html")).unwrap();
    assert_eq!(decoded.text, "hello");
    assert_eq!(decoded.encoding_label, "UTF-8");
}

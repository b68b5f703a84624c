// Snapshot tests for rendered line and page markup

use tahkik::apparatus::{merge_footnotes, resolve_text};
use tahkik::config::Settings;
use tahkik::model::{ErrorSpanSet, Footnote};
use tahkik::playback::PlaybackPosition;
use tahkik::records::{BestMatch, FootnoteRecord, LineRecord};
use tahkik::{DocumentStore, ErrorSpan, FootnoteKind, Witness};
use uuid::Uuid;

fn span(token: usize, sources: &[&str]) -> ErrorSpan {
    ErrorSpan {
        global_token_index: token,
        sources: sources.iter().map(|s| s.to_string()).collect(),
        wrong: String::new(),
        suggestion: String::new(),
        reason: String::new(),
    }
}

fn line_record(line_no: u32, raw: &str, marks: Vec<ErrorSpan>) -> LineRecord {
    LineRecord {
        line_no,
        best: BestMatch {
            raw: raw.to_string(),
            start_word: None,
        },
        line_marks: marks,
        page_image: "0001.jpg".to_string(),
        bbox: None,
    }
}

fn footnote_record(
    id: u128,
    line_no: u32,
    index: usize,
    kind: FootnoteKind,
    nusha_index: u8,
    content: &str,
) -> FootnoteRecord {
    FootnoteRecord {
        id: Uuid::from_u128(id),
        line_no,
        index,
        kind,
        nusha_index,
        content: content.to_string(),
    }
}

#[test]
fn test_styled_line_with_marker() {
    let spans: ErrorSpanSet = [span(11, &["A"]), span(12, &["a", "b", "c"])]
        .into_iter()
        .collect();
    let markup = resolve_text(
        1,
        "bismillah ar-rahman ar-rahim",
        10,
        &spans,
        PlaybackPosition::at(10),
    );
    let note = Footnote {
        id: Uuid::from_u128(1),
        ..Footnote::new(1, 9, FootnoteKind::Variation, Witness::default(), "x")
    };
    let merged = merge_footnotes(markup, &[note], 1);

    insta::assert_snapshot!(merged.to_html(), @r#"<span class="line" data-line-no="1"><span class="now-playing" data-token="10">bismillah</span><sup class="fn-marker fn-variation" data-ignore="true" data-footnote="00000000-0000-0000-0000-000000000001">1</sup> <span class="mark-single mark-a" data-token="11">ar-rahman</span> <span class="mark-all" data-token="12">ar-rahim</span></span>"#);
}

#[test]
fn test_plain_line_is_escaped() {
    let markup = resolve_text(
        2,
        "x & <y>",
        0,
        &ErrorSpanSet::new(),
        PlaybackPosition::none(),
    );
    insta::assert_snapshot!(markup.to_html(), @r#"<span class="line" data-line-no="2">x &amp; &lt;y&gt;</span>"#);
}

#[test]
fn test_rendered_page() {
    let mut store = DocumentStore::new(Settings::default());
    store.load_witness(
        Witness::default(),
        vec![
            line_record(1, "bir iki üç", vec![span(1, &["A", "B"])]),
            line_record(2, "dört beş", Vec::new()),
        ],
    );
    store
        .load_footnotes(vec![
            footnote_record(1, 1, 3, FootnoteKind::Variation, 2, "iki"),
            footnote_record(2, 2, 8, FootnoteKind::Omission, 3, "beş"),
            footnote_record(3, 1, 7, FootnoteKind::Addition, 4, "ve"),
        ])
        .unwrap();

    let page = store.render_page(0, PlaybackPosition::none()).unwrap();
    let entries: Vec<String> = page.apparatus.iter().map(|e| e.to_string()).collect();
    assert_eq!(entries, vec!["1. B: iki", "2. D: + ve", "3. C: - beş"]);

    insta::assert_snapshot!(page.to_html().trim_end(), @r#"
<section class="page" data-page="page-1">
  <p><span class="line" data-line-no="1">bir<sup class="fn-marker fn-variation" data-ignore="true" data-footnote="00000000-0000-0000-0000-000000000001">1</sup> <span class="mark-pair mark-a-b" data-token="1">iki</span><sup class="fn-marker fn-addition" data-ignore="true" data-footnote="00000000-0000-0000-0000-000000000003">2</sup> üç</span></p>
  <p><span class="line" data-line-no="2">dört beş<sup class="fn-marker fn-omission" data-ignore="true" data-footnote="00000000-0000-0000-0000-000000000002">3</sup></span></p>
  <div class="apparatus">
    <p data-footnote="00000000-0000-0000-0000-000000000001">1. B: iki</p>
    <p data-footnote="00000000-0000-0000-0000-000000000003">2. D: + ve</p>
    <p data-footnote="00000000-0000-0000-0000-000000000002">3. C: - beş</p>
  </div>
</section>
"#);
}

#[test]
fn test_numbering_restarts_per_page() {
    let mut settings = Settings::default();
    // One line per page
    settings.layout.page_content_height = 40.0;
    let mut store = DocumentStore::new(settings);
    store.load_witness(
        Witness::default(),
        vec![line_record(1, "bir", Vec::new()), line_record(2, "iki", Vec::new())],
    );
    store
        .load_footnotes(vec![
            footnote_record(1, 1, 0, FootnoteKind::Variation, 2, "a"),
            footnote_record(2, 2, 3, FootnoteKind::Variation, 2, "b"),
        ])
        .unwrap();

    assert_eq!(store.pages().len(), 2);
    let second = store.render_page(1, PlaybackPosition::none()).unwrap();
    assert_eq!(second.key, "page-2");
    assert_eq!(second.apparatus[0].number, 1);
    insta::assert_snapshot!(second.lines[0].to_html(), @r#"<span class="line" data-line-no="2">iki<sup class="fn-marker fn-variation" data-ignore="true" data-footnote="00000000-0000-0000-0000-000000000002">1</sup></span>"#);
}

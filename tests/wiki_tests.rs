use serde_json::json;
use spectral::prelude::*;
use url::Url;
use wikipoi::error::WikiError;
use wikipoi::wiki::{
    SearchHit, WikiClient, file_url, search_hits_from_response, wikitext_from_response,
};

#[test]
fn wikitext_is_read_from_parse_response() {
    let body = json!({
        "parse": {
            "title": "Josefskirchplatz",
            "pageid": 42,
            "wikitext": { "*": "== Fotos ==\n[[Datei:a.jpg]]" }
        }
    });

    assert_that(&wikitext_from_response("Josefskirchplatz", &body).expect("wikitext"))
        .is_equal_to("== Fotos ==\n[[Datei:a.jpg]]".to_owned());
}

#[test]
fn api_error_means_page_not_found() {
    let body = json!({
        "error": {
            "code": "missingtitle",
            "info": "The page you specified doesn't exist."
        }
    });

    let result = wikitext_from_response("Nirgendwo", &body);

    assert_that(&matches!(
        result,
        Err(WikiError::PageNotFound { ref page, ref info })
            if page == "Nirgendwo" && info == "The page you specified doesn't exist."
    ))
    .is_true();
}

#[test]
fn response_without_wikitext_is_unexpected() {
    let result = wikitext_from_response("Seite", &json!({ "parse": { "title": "Seite" } }));

    assert_that(&matches!(result, Err(WikiError::UnexpectedResponse { .. }))).is_true();
}

#[test]
fn search_hits_are_read() {
    let body = json!({
        "batchcomplete": "",
        "query": {
            "searchinfo": { "totalhits": 2 },
            "search": [
                { "ns": 0, "title": "Josefskirchplatz", "pageid": 7, "snippet": "<span>Givebox</span>" },
                { "ns": 0, "title": "Hafen" }
            ]
        }
    });

    let hits = search_hits_from_response("givebox", &body).expect("hits");

    assert_that(&hits).is_equal_to(vec![
        SearchHit {
            title: "Josefskirchplatz".to_owned(),
            pageid: 7,
            snippet: "<span>Givebox</span>".to_owned(),
        },
        SearchHit {
            title: "Hafen".to_owned(),
            pageid: 0,
            snippet: String::new(),
        },
    ]);
}

#[test]
fn missing_search_list_is_unexpected() {
    let result = search_hits_from_response("givebox", &json!({ "query": {} }));

    assert_that(&result.is_err()).is_true();
}

#[test]
fn file_url_points_at_special_file_path() {
    let index_url = Url::parse("https://www.muenster4you.de/w/index.php").expect("url");

    assert_that(&file_url(&index_url, "Inhalt Josef.jpg").as_str()).is_equal_to(
        "https://www.muenster4you.de/w/index.php?title=Special%3AFilePath%2FInhalt+Josef.jpg",
    );
}

#[test]
fn index_url_sits_next_to_api() {
    let client = WikiClient::new(Url::parse("https://www.muenster4you.de/w/api.php").expect("url"))
        .expect("client");

    assert_that(&client.index_url().expect("index url").as_str())
        .is_equal_to("https://www.muenster4you.de/w/index.php");
}

use filings_spider::fetch::{Fetcher, RetryPolicy};
use filings_spider::index::{IndexFilter, IndexRecord, ARCHIVE_BASE};
use filings_spider::metadata::{Enrichment, MetadataJob};
use filings_spider::Error;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROFILE: &str = include_str!("files/profile.html");
const FILING: &str = include_str!("files/filing_index.html");

const METADATA_HEADER: &str =
    "cik,currName,fDate,fType,irsNum,sicDesc,sic,sInc,sLoc,bAddress,mAddress,fUrl";

fn fetcher() -> Fetcher {
    let policy = RetryPolicy {
        backoff_factor: Duration::ZERO,
        ..Default::default()
    };
    Fetcher::new("filings-tests admin@example.com", policy).unwrap()
}

fn write_index(dir: &Path, name: &str, rows: &[&str]) {
    let mut text = rows.join("\n");
    text.push('\n');
    std::fs::write(dir.join(name), text).unwrap();
}

fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
    csv::Reader::from_path(path)
        .unwrap()
        .records()
        .map(|row| row.unwrap())
        .collect()
}

fn profile_base(server: &MockServer) -> String {
    format!(
        "{}/cgi-bin/browse-edgar?action=getcompany&owner=exclude&CIK=",
        server.uri()
    )
}

async fn mount_edgar(server: &MockServer, profile: &str, filing: &str) {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/browse-edgar"))
        .and(query_param("CIK", "0000012345"))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Archives/path.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(filing))
        .mount(server)
        .await;
}

// index
// ----------------------------------------------------------------------------

#[test]
fn filters_a_quarter_into_the_consolidated_table() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("indices");
    std::fs::create_dir(&source).unwrap();
    write_index(
        &source,
        "2019QTR1.tsv",
        &["0000012345|Acme Co|10-K|2019-03-01|path.txt|path.html"],
    );

    let destination = dir.path().join("10-K_index.csv");
    let summary = IndexFilter::new(&source, &destination)
        .years(vec![2019, 2020])
        .run(false)
        .unwrap();
    assert_eq!(summary.files_selected, 1);
    assert_eq!(summary.rows_written, 1);

    let text = std::fs::read_to_string(&destination).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("cik,firm_name,file_type,report_date,file_url_txt,file_url_html,report_year")
    );
    assert_eq!(
        lines.next(),
        Some(
            "0000012345,Acme Co,10-K,2019-03-01,\
             https://sec.gov/Archives/path.txt,https://sec.gov/Archives/path.html,2019"
        )
    );
    assert_eq!(lines.next(), None);
}

#[test]
fn never_emits_rows_outside_the_filter() {
    let dir = tempfile::tempdir().unwrap();
    write_index(
        dir.path(),
        "2019-QTR1.tsv",
        &[
            "12345|ACME CO|10-K|2019-03-01|a.txt|a-index.html",
            "12345|ACME CO|10-Q|2019-03-01|b.txt|b-index.html",
            "67890|GLOBEX CORP|10-K|2019-02-01|c.txt|c-index.html",
            "67890|GLOBEX CORP|10-K|not a date|d.txt|d-index.html",
        ],
    );
    write_index(
        dir.path(),
        "2019-QTR2.tsv",
        &[
            "12345|ACME CO|10-K|2018-12-31|e.txt|e-index.html",
            "12345|ACME CO|10-K/A|2019-05-01|f.txt|f-index.html",
            "12345|ACME CO|10-K|2019-05-02|g.txt|g-index.html",
        ],
    );
    // year not selected, never read
    write_index(
        dir.path(),
        "2018-QTR4.tsv",
        &["12345|ACME CO|10-K|2018-11-01|h.txt|h-index.html"],
    );

    let destination = dir.path().join("out").join("10-K_index.csv");
    let summary = IndexFilter::new(dir.path(), &destination)
        .years(vec![2019, 2000])
        .ciks(Some(HashSet::from(["0000012345".to_string()])))
        .run(false)
        .unwrap();
    assert_eq!(summary.files_selected, 2);
    assert_eq!(summary.files_read, 2);
    assert_eq!(summary.rows_written, 2);

    let rows: Vec<IndexRecord> = csv::Reader::from_path(&destination)
        .unwrap()
        .deserialize()
        .map(|row| row.unwrap())
        .collect();
    assert_eq!(rows.len(), summary.rows_written);
    for row in &rows {
        assert_eq!(row.cik, "0000012345");
        assert_eq!(row.file_type, "10-K");
        assert_eq!(row.report_year, Some(2019));
        assert!(row.file_url_txt.as_deref().unwrap().starts_with(ARCHIVE_BASE));
    }
}

#[test]
fn appends_without_repeating_the_header() {
    let dir = tempfile::tempdir().unwrap();
    write_index(
        dir.path(),
        "2019-QTR1.tsv",
        &["12345|ACME CO|10-K|2019-03-01|a.txt|a-index.html"],
    );
    let destination = dir.path().join("10-K_index.csv");
    let filter = IndexFilter::new(dir.path(), &destination).years(vec![2019, 2020]);

    filter.run(false).unwrap();
    filter.run(false).unwrap();

    let text = std::fs::read_to_string(&destination).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert_eq!(text.matches("firm_name").count(), 1);
}

#[test]
fn malformed_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_index(
        dir.path(),
        "2019-QTR1.tsv",
        &["12345|ACME CO|10-K|2019-03-01|a.txt|a-index.html|surplus"],
    );
    write_index(
        dir.path(),
        "2019-QTR2.tsv",
        &["12345|ACME CO|10-K|2019-04-01|b.txt"],
    );

    let destination = dir.path().join("10-K_index.csv");
    let summary = IndexFilter::new(dir.path(), &destination)
        .years(vec![2019, 2020])
        .run(false)
        .unwrap();
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.rows_written, 1);

    // the html column is missing, so only the text column is rewritten
    let rows = read_rows(&destination);
    assert_eq!(&rows[0][4], "https://sec.gov/Archives/b.txt");
    assert_eq!(&rows[0][5], "");
}

#[test]
fn unnormalizable_cik_halts_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    write_index(
        dir.path(),
        "2019-QTR1.tsv",
        &["|ACME CO|10-K|2019-03-01|a.txt|a-index.html"],
    );

    let err = IndexFilter::new(dir.path(), dir.path().join("10-K_index.csv"))
        .years(vec![2019, 2020])
        .run(false)
        .unwrap_err();
    assert!(matches!(err, Error::CikNormalization { .. }));
}

// metadata
// ----------------------------------------------------------------------------

#[tokio::test]
async fn enriches_a_filtered_row() {
    let server = MockServer::start().await;
    mount_edgar(&server, PROFILE, FILING).await;

    let dir = tempfile::tempdir().unwrap();
    write_index(
        dir.path(),
        "2019QTR1.tsv",
        &["0000012345|Acme Co|10-K|2019-03-01|path.txt|path.html"],
    );
    let index = dir.path().join("10-K_index.csv");
    IndexFilter::new(dir.path(), &index)
        .years(vec![2019, 2020])
        .archive_base(format!("{}/Archives/", server.uri()))
        .run(false)
        .unwrap();

    let output = dir.path().join("SEC_datafile.csv");
    let summary = MetadataJob::new(&index, &output)
        .profile_base(profile_base(&server))
        .run(&fetcher(), false)
        .await
        .unwrap();
    assert_eq!(summary.rows, 1);
    assert_eq!(summary.enriched, 1);

    let text = std::fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().next(), Some(METADATA_HEADER));

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(&row[0], "0000012345");
    assert_eq!(&row[1], "Acme Co");
    assert_eq!(&row[2], "2019-03-01");
    assert_eq!(&row[3], "10-K");
    assert_eq!(&row[4], "987654321");
    assert_eq!(&row[5], "Widgets");
    assert_eq!(&row[6], "1234");
    assert_eq!(&row[7], "DE");
    assert_eq!(&row[8], "CA");
    assert_eq!(&row[9], "1 WIDGET WAY SAN JOSE CA 95101 408 555 0100");
    assert_eq!(&row[10], "PO BOX 100 WILMINGTON DE 19801");
    assert_eq!(&row[11], format!("{}/Archives/path.html", server.uri()));
}

#[tokio::test]
async fn pages_without_markup_degrade_to_identifying_fields() {
    let server = MockServer::start().await;
    mount_edgar(&server, "<html><body>No matching company</body></html>", FILING).await;

    let row = IndexRecord {
        cik: "0000012345".to_string(),
        firm_name: "Acme Co".to_string(),
        file_type: "10-K".to_string(),
        report_date: chrono::NaiveDate::from_ymd_opt(2019, 3, 1),
        file_url_txt: None,
        file_url_html: Some(format!("{}/Archives/path.html", server.uri())),
        report_year: Some(2019),
    };
    let job = MetadataJob::new("unused.csv", "unused.csv").profile_base(profile_base(&server));

    let enrichment = job.enrich(&fetcher(), &row).await;
    assert!(matches!(enrichment, Enrichment::Degraded { .. }));

    let record = enrichment.into_record();
    assert_eq!(record.cik, "0000012345");
    assert_eq!(record.firm_name, "Acme Co");
    assert_eq!(record.file_type, "10-K");
    for field in [
        &record.sic,
        &record.sic_description,
        &record.irs_number,
        &record.state_of_incorporation,
        &record.state_of_location,
        &record.business_address,
        &record.mailing_address,
    ] {
        assert!(field.is_empty());
    }
}

#[tokio::test]
async fn every_row_yields_one_record() {
    let server = MockServer::start().await;
    mount_edgar(&server, PROFILE, FILING).await;
    // any other company profile is gone
    Mock::given(method("GET"))
        .and(path("/cgi-bin/browse-edgar"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let index = dir.path().join("10-K_index.csv");
    let archive = format!("{}/Archives", server.uri());
    std::fs::write(
        &index,
        format!(
            "cik,firm_name,file_type,report_date,file_url_txt,file_url_html,report_year\n\
             12345,Acme Co,10-K,2019-03-01,{archive}/path.txt,{archive}/path.html,2019.0\n\
             67890,Globex Corp,10-K,2019-04-01,{archive}/g.txt,{archive}/g.html,2019\n\
             12345,Acme Co,10-K,2019-05-01,{archive}/path.txt,,2019\n"
        ),
    )
    .unwrap();

    let output = dir.path().join("SEC_datafile.csv");
    let summary = MetadataJob::new(&index, &output)
        .chunk_size(2)
        .profile_base(profile_base(&server))
        .run(&fetcher(), false)
        .await
        .unwrap();
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.enriched, 1);
    assert_eq!(summary.fetch_failed, 1);
    assert_eq!(summary.degraded, 1);

    let rows = read_rows(&output);
    let ciks: Vec<&str> = rows.iter().map(|row| &row[0]).collect();
    assert_eq!(ciks, vec!["0000012345", "0000067890", "0000012345"]);
    assert_eq!(&rows[1][1], "Globex Corp");
    assert_eq!(&rows[1][6], "");
}

#[tokio::test]
async fn pairs_limit_the_enriched_rows() {
    let server = MockServer::start().await;
    mount_edgar(&server, PROFILE, FILING).await;

    let dir = tempfile::tempdir().unwrap();
    let index = dir.path().join("10-K_index.csv");
    let archive = format!("{}/Archives", server.uri());
    std::fs::write(
        &index,
        format!(
            "cik,firm_name,file_type,report_date,file_url_txt,file_url_html,report_year\n\
             12345,Acme Co,10-K,2019-03-01,{archive}/path.txt,{archive}/path.html,2019\n\
             12345,Acme Co,10-K,2020-03-01,{archive}/path.txt,{archive}/path.html,2020\n"
        ),
    )
    .unwrap();

    let output = dir.path().join("SEC_datafile.csv");
    let summary = MetadataJob::new(&index, &output)
        .pairs(Some(HashSet::from([("0000012345".to_string(), 2020)])))
        .profile_base(profile_base(&server))
        .run(&fetcher(), false)
        .await
        .unwrap();
    assert_eq!(summary.rows, 1);

    let rows = read_rows(&output);
    assert_eq!(&rows[0][2], "2020-03-01");
}

#[tokio::test]
async fn header_is_written_before_any_row() {
    let dir = tempfile::tempdir().unwrap();
    let index = dir.path().join("10-K_index.csv");
    std::fs::write(
        &index,
        "cik,firm_name,file_type,report_date,file_url_txt,file_url_html,report_year\n",
    )
    .unwrap();

    let output = dir.path().join("SEC_datafile.csv");
    let summary = MetadataJob::new(&index, &output)
        .run(&fetcher(), false)
        .await
        .unwrap();
    assert_eq!(summary.rows, 0);
    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        format!("{METADATA_HEADER}\n")
    );
}

use epi_canon::table::render_table;

#[test]
fn render_table_aligns_columns() {
    let headers = vec!["id".to_string(), "name".to_string()];
    let rows = vec![
        vec!["1".to_string(), "Alice".to_string()],
        vec!["2".to_string(), "Bob".to_string()],
    ];

    let rendered = render_table(&headers, &rows);
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines, vec!["id  name", "--  -----", " 1  Alice", " 2  Bob"]);
}

#[test]
fn render_table_right_aligns_counts_only() {
    let headers = vec!["dataset".to_string(), "written".to_string()];
    let rows = vec![
        vec!["mpox".to_string(), "1234".to_string()],
        vec!["covid19_daily".to_string(), "7".to_string()],
    ];

    let rendered = render_table(&headers, &rows);
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines[2], "mpox              1234");
    assert_eq!(lines[3], "covid19_daily        7");
}

#[test]
fn render_table_normalizes_control_characters() {
    let headers = vec!["note".to_string()];
    let rows = vec![vec!["line1\nline2\tvalue".to_string()]];

    let rendered = render_table(&headers, &rows);
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2], "line1 line2 value");
}

#[test]
fn render_table_counts_characters_not_bytes() {
    let headers = vec!["country_region".to_string(), "status".to_string()];
    let rows = vec![vec!["Curaçao".to_string(), "ok".to_string()]];

    let rendered = render_table(&headers, &rows);
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines[2], "Curaçao         ok");
}

use fleet_core::FleetResult;
use futures_util::Stream;
use rust_xlsxwriter::Workbook;
use std::path::Path;

/// Write `rows` (header first) to `Sheet1` of a new workbook at `path`.
pub fn write_sheet(path: &Path, rows: &[&[&str]]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1").expect("sheet name");
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            sheet
                .write_string(r as u32, c as u16, *cell)
                .expect("write cell");
        }
    }
    workbook.save(path).expect("save workbook");
}

/// Split `bytes` into an upload stream of `size`-byte chunks.
pub fn chunked(bytes: Vec<u8>, size: usize) -> impl Stream<Item = FleetResult<Vec<u8>>> + Send {
    let parts: Vec<FleetResult<Vec<u8>>> = bytes.chunks(size).map(|c| Ok(c.to_vec())).collect();
    futures_util::stream::iter(parts)
}

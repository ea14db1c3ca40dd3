//! 标签表与 ICDAR 格式的 CSV 输出。

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::errors::PipelineError;

/// 标签表列名，无标签时仍写出表头。
pub const LABEL_HEADER: [&str; 16] = [
    "Text ID",
    "Text Name",
    "Text X",
    "Text Y",
    "Text Rotation",
    "Type",
    "Text Width",
    "Text Height",
    "LowerLeft X",
    "LowerLeft Y",
    "UpperRight X",
    "UpperRight Y",
    "Filename",
    "Source",
    "Label",
    "Review",
];

pub const ICDAR_HEADER: [&str; 9] = ["tlx", "tly", "trx", "try", "brx", "bry", "blx", "bly", "text"];

/// 输出表中的一行，对应一个标签片段；同一标签的前后缀片段相邻且 `label` 相同。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelRecord {
    #[serde(rename = "Text ID")]
    pub text_id: String,
    #[serde(rename = "Text Name")]
    pub text_name: String,
    #[serde(rename = "Text X")]
    pub text_x: f64,
    #[serde(rename = "Text Y")]
    pub text_y: f64,
    #[serde(rename = "Text Rotation")]
    pub text_rotation: f64,
    #[serde(rename = "Type")]
    pub pattern: String,
    /// 绘图坐标下的外框宽度。
    #[serde(rename = "Text Width")]
    pub text_width: f64,
    #[serde(rename = "Text Height")]
    pub text_height: f64,
    /// 以下四列为像素坐标，左下角取像素空间最小角点。
    #[serde(rename = "LowerLeft X")]
    pub lower_left_x: f64,
    #[serde(rename = "LowerLeft Y")]
    pub lower_left_y: f64,
    #[serde(rename = "UpperRight X")]
    pub upper_right_x: f64,
    #[serde(rename = "UpperRight Y")]
    pub upper_right_y: f64,
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Label")]
    pub label: usize,
    #[serde(rename = "Review")]
    pub review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IcdarRecord {
    pub tlx: f64,
    pub tly: f64,
    pub trx: f64,
    #[serde(rename = "try")]
    pub try_: f64,
    pub brx: f64,
    pub bry: f64,
    pub blx: f64,
    pub bly: f64,
    pub text: String,
}

impl From<&LabelRecord> for IcdarRecord {
    fn from(record: &LabelRecord) -> Self {
        let (left, top) = (record.lower_left_x, record.lower_left_y);
        let (right, bottom) = (record.upper_right_x, record.upper_right_y);
        Self {
            tlx: left,
            tly: top,
            trx: right,
            try_: top,
            brx: right,
            bry: bottom,
            blx: left,
            bly: bottom,
            text: record.text_name.clone(),
        }
    }
}

fn write_rows<W, T>(writer: W, header: &[&str], rows: &[T]) -> Result<(), csv::Error>
where
    W: io::Write,
    T: Serialize,
{
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(header)?;
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_labels<W: io::Write>(writer: W, records: &[LabelRecord]) -> Result<(), csv::Error> {
    write_rows(writer, &LABEL_HEADER, records)
}

pub fn write_icdar<W: io::Write>(writer: W, records: &[LabelRecord]) -> Result<(), csv::Error> {
    let rows: Vec<IcdarRecord> = records.iter().map(IcdarRecord::from).collect();
    write_rows(writer, &ICDAR_HEADER, &rows)
}

/// 写出标签表，必要时创建父目录。
pub fn write_labels_to_path(path: &Path, records: &[LabelRecord]) -> Result<(), PipelineError> {
    write_file(path, |file| write_labels(file, records))
}

pub fn write_icdar_to_path(path: &Path, records: &[LabelRecord]) -> Result<(), PipelineError> {
    write_file(path, |file| write_icdar(file, records))
}

fn write_file<F>(path: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(fs::File) -> Result<(), csv::Error>,
{
    let output_error = |source: csv::Error| PipelineError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| output_error(err.into()))?;
    }
    let file = fs::File::create(path).map_err(|err| output_error(err.into()))?;
    write(file).map_err(output_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LabelRecord {
        LabelRecord {
            text_id: "1A2".to_string(),
            text_name: "6\"-AD-12345678-A11".to_string(),
            text_x: 100.0,
            text_y: 200.0,
            text_rotation: 0.0,
            pattern: "F".to_string(),
            text_width: 40.5,
            text_height: 3.333,
            lower_left_x: 100.0,
            lower_left_y: 801.0,
            upper_right_x: 200.0,
            upper_right_y: 901.0,
            filename: "sheet-01".to_string(),
            source: "T".to_string(),
            label: 0,
            review: false,
        }
    }

    #[test]
    fn empty_table_still_has_header() {
        let mut buffer = Vec::new();
        write_labels(&mut buffer, &[]).expect("写出失败");
        let text = String::from_utf8(buffer).expect("应为 UTF-8");
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("Text ID,Text Name,Text X,Text Y,Text Rotation,Type,"));
        assert!(text.trim_end().ends_with("Filename,Source,Label,Review"));
    }

    #[test]
    fn label_row_follows_header_order() {
        let mut buffer = Vec::new();
        write_labels(&mut buffer, &[record()]).expect("写出失败");
        let text = String::from_utf8(buffer).expect("应为 UTF-8");
        let row = text.lines().nth(1).expect("应有数据行");
        assert_eq!(
            row,
            "1A2,\"6\"\"-AD-12345678-A11\",100.0,200.0,0.0,F,40.5,3.333,100.0,801.0,200.0,901.0,sheet-01,T,0,false"
        );
    }

    #[test]
    fn icdar_row_lists_corners_clockwise() {
        let mut buffer = Vec::new();
        write_icdar(&mut buffer, &[record()]).expect("写出失败");
        let text = String::from_utf8(buffer).expect("应为 UTF-8");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("tlx,tly,trx,try,brx,bry,blx,bly,text"));
        assert_eq!(
            lines.next(),
            Some("100.0,801.0,200.0,801.0,200.0,901.0,100.0,901.0,\"6\"\"-AD-12345678-A11\"")
        );
    }

    #[test]
    fn path_writer_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("临时目录");
        let path = dir.path().join("nested").join("sheet.csv");
        write_labels_to_path(&path, &[record()]).expect("写出失败");
        let text = fs::read_to_string(&path).expect("读取输出");
        assert_eq!(text.lines().count(), 2);
    }
}

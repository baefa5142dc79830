// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read a `TestReport`.

use crate::{ReadError, Test, TestCase, TestReport, TestStatus};
use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::read::ZlibDecoder;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::io::{self, Read};

static TEST_TAG: &[u8] = b"Test";
static NAME_TAG: &[u8] = b"Name";
static NAMED_MEASUREMENT_TAG: &[u8] = b"NamedMeasurement";
static MEASUREMENT_TAG: &[u8] = b"Measurement";
static VALUE_TAG: &[u8] = b"Value";
static TEST_CASE_TAG: &[u8] = b"TestCase";

pub(crate) fn read_report(reader: impl io::BufRead) -> Result<TestReport, ReadError> {
    let mut reader = Reader::from_reader(reader);
    let mut buf = Vec::new();
    let mut state = ReadState::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => state.start(&e)?,
            Event::Empty(e) => {
                // <Value/> and friends are a start immediately followed by an end.
                state.start(&e)?;
                state.end(e.name().as_ref())?;
            }
            Event::End(e) => state.end(e.name().as_ref())?,
            Event::Text(text) => state.text(&text.unescape()?),
            Event::CData(cdata) => state.text(&String::from_utf8_lossy(&cdata.into_inner())),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(TestReport { tests: state.tests })
}

#[derive(Debug, Default)]
struct ReadState {
    tests: Vec<Test>,
    current: Option<Test>,
    in_name: bool,
    measurement: Option<String>,
    in_output: bool,
    value: Option<PendingValue>,
}

#[derive(Debug)]
struct PendingValue {
    encoding: Option<String>,
    compression: Option<String>,
    text: String,
}

impl ReadState {
    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), ReadError> {
        let name = e.name();
        if name.as_ref() == TEST_TAG {
            if let Some(status) = attribute(e, b"Status")? {
                let status = TestStatus::from_attr(&status)
                    .ok_or(ReadError::UnknownStatus { status })?;
                self.current = Some(Test::new(status));
                return Ok(());
            }
        }

        let Some(test) = &mut self.current else {
            return Ok(());
        };
        match name.as_ref() {
            n if n == NAME_TAG => self.in_name = true,
            n if n == NAMED_MEASUREMENT_TAG => {
                if let Some(measurement) = attribute(e, b"name")? {
                    self.measurement = Some(measurement);
                }
            }
            n if n == MEASUREMENT_TAG => self.in_output = true,
            n if n == VALUE_TAG => {
                self.value = Some(PendingValue {
                    encoding: attribute(e, b"encoding")?,
                    compression: attribute(e, b"compression")?,
                    text: String::new(),
                });
            }
            n if n == TEST_CASE_TAG => {
                let case_name = attribute(e, b"name")?
                    .ok_or(ReadError::MissingTestCaseAttribute { attr: "name" })?;
                let state = attribute(e, b"state")?
                    .ok_or(ReadError::MissingTestCaseAttribute { attr: "state" })?;
                test.test_cases.push(TestCase::new(case_name, state));
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) -> Result<(), ReadError> {
        if name == TEST_TAG {
            if let Some(test) = self.current.take() {
                self.tests.push(test);
            }
            self.in_name = false;
            self.measurement = None;
            self.in_output = false;
            self.value = None;
            return Ok(());
        }

        let Some(test) = &mut self.current else {
            return Ok(());
        };
        match name {
            n if n == NAME_TAG => self.in_name = false,
            n if n == NAMED_MEASUREMENT_TAG => self.measurement = None,
            n if n == MEASUREMENT_TAG => self.in_output = false,
            n if n == VALUE_TAG => {
                if let Some(value) = self.value.take() {
                    let decoded = decode_value(value)?;
                    if let Some(measurement) = &self.measurement {
                        test.measurements
                            .entry(measurement.clone())
                            .or_default()
                            .push_str(&decoded);
                    } else if self.in_output {
                        test.output.push_str(&decoded);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let Some(test) = &mut self.current else {
            return;
        };
        if self.in_name {
            test.name.get_or_insert_with(String::new).push_str(text);
        } else if let Some(value) = &mut self.value {
            value.text.push_str(text);
        }
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, ReadError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn decode_value(value: PendingValue) -> Result<String, ReadError> {
    let PendingValue {
        encoding,
        compression,
        text,
    } = value;

    let bytes = match encoding.as_deref() {
        None => None,
        Some("base64") => {
            // Producers wrap long base64 payloads across lines.
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            Some(STANDARD.decode(compact).map_err(ReadError::Base64)?)
        }
        Some(other) => {
            return Err(ReadError::UnknownEncoding {
                encoding: other.to_owned(),
            });
        }
    };

    let bytes = match compression.as_deref() {
        None => bytes,
        Some("gzip") => {
            let input = bytes.as_deref().unwrap_or(text.as_bytes());
            let mut inflated = Vec::new();
            ZlibDecoder::new(input)
                .read_to_end(&mut inflated)
                .map_err(ReadError::Decompress)?;
            Some(inflated)
        }
        Some(other) => {
            return Err(ReadError::UnknownCompression {
                compression: other.to_owned(),
            });
        }
    };

    Ok(match bytes {
        Some(bytes) => decode_latin1(&bytes),
        None => text,
    })
}

/// Latin-1 maps every byte to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

mod test_helpers;

use chrono::{Duration, TimeZone, Utc};
use flight::{Blob, ClientManifest, RequestOptions, TypedArray, Value};
use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use test_helpers::{decode, encode, encode_with, roundtrip, text};

#[test]
fn test_plain_object_wire_format() {
    let model = Value::object([
        ("a", Value::from(1)),
        ("s", Value::from("$x")),
        ("u", Value::Undefined),
        ("n", Value::Null),
        ("b", Value::from(true)),
    ]);
    assert_eq!(
        text(&encode(model)),
        "0:{\"a\":1,\"s\":\"$$x\",\"u\":\"$undefined\",\"n\":null,\"b\":true}\n"
    );
}

#[test]
fn test_special_numbers() {
    let model = Value::array(vec![
        Value::from(f64::NAN),
        Value::from(-0.0),
        Value::from(f64::INFINITY),
        Value::from(f64::NEG_INFINITY),
        Value::from(1.5),
    ]);
    let bytes = encode(model.clone());
    assert_eq!(text(&bytes), "0:[\"$NaN\",\"$-0\",\"$Infinity\",\"$-Infinity\",1.5]\n");

    let decoded = decode(&bytes);
    assert_eq!(decoded, model);
    assert!(decoded.at(1).unwrap().as_f64().unwrap().is_sign_negative());
}

#[test]
fn test_scalars_roundtrip() {
    let date = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
    let model = Value::object([
        ("big", Value::from(BigInt::from(-12345678901234567890i128))),
        ("date", Value::from(date)),
        ("precise", Value::from(date + Duration::nanoseconds(1_234_567))),
        ("dollar", Value::from("$$already")),
        ("symbol", Value::Symbol("react.fragment".to_owned())),
        ("undefined", Value::Undefined),
        ("empty", Value::from("")),
    ]);
    let decoded = roundtrip(model.clone());
    assert_eq!(decoded, model);
    assert_eq!(decoded.get("undefined"), Some(Value::Undefined));
}

#[test]
fn test_symbols_share_one_row() {
    let symbol = Value::Symbol("app.marker".to_owned());
    let bytes = encode(Value::array(vec![symbol.clone(), symbol]));
    assert_eq!(text(&bytes), "1:\"$Sapp.marker\"\n0:[\"$1\",\"$1\"]\n");
}

#[test]
fn test_collections_roundtrip() {
    let key = Value::object([("id", Value::from(7))]);
    let model = Value::object([
        (
            "map",
            Value::map(vec![
                (Value::from("one"), Value::from(1)),
                (key.clone(), Value::from("object key")),
            ]),
        ),
        ("set", Value::set(vec![Value::from(1), Value::from("two"), key])),
        (
            "form",
            Value::form_data(vec![("name", Value::from("ada")), ("age", Value::from("36"))]),
        ),
    ]);
    let decoded = roundtrip(model.clone());
    assert_eq!(decoded, model);
}

#[test]
fn test_binary_values_roundtrip() {
    let model = Value::object([
        ("floats", Value::from(TypedArray::from_f64(&[1.5, -2.25, 1e300]))),
        ("shorts", Value::from(TypedArray::from_i16(&[-1, 2, i16::MAX]))),
        ("bytes", Value::from(TypedArray::from_u8(&[0, 1, 254, 255]))),
        ("blob", Value::Blob(Blob::new("text/plain", "hello"))),
    ]);
    let decoded = roundtrip(model.clone());
    assert_eq!(decoded, model);

    let floats = decoded.get("floats").unwrap();
    let Value::TypedArray(floats) = floats else {
        panic!("expected a typed array, got {floats:?}");
    };
    assert_eq!(floats.to_f64_vec(), Some(vec![1.5, -2.25, 1e300]));
}

#[test]
fn test_large_text_is_outlined() {
    let options = RequestOptions::new().large_text_threshold(8);
    let bytes = encode_with(Value::from("hello world!!"), ClientManifest::new(), options);
    assert_eq!(text(&bytes), "1:Td,hello world!!0:\"$1\"\n");
    assert_eq!(decode(&bytes), Value::from("hello world!!"));
}

#[test]
fn test_short_text_stays_inline() {
    let options = RequestOptions::new().large_text_threshold(64);
    let bytes = encode_with(Value::from("short"), ClientManifest::new(), options);
    assert_eq!(text(&bytes), "0:\"short\"\n");
}

//! `chrono` types as string leaves: ISO-8601 dates and date-times, RFC 3339
//! timestamps.
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::descriptor::{Kind, Mapped, TypeDescriptor};
use crate::element::Element;
use crate::recipe::Recipe;
use crate::recipe::scalars::expect_str;

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

impl Mapped for NaiveDate {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::custom::<Self>("ISO-8601 date").leaf(
            Element::is_string,
            |element| Ok(expect_str(element)?.parse::<NaiveDate>()?),
            |date| Ok(Element::from(date.format("%Y-%m-%d").to_string())),
        )]
    }
}

impl Mapped for NaiveDateTime {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::custom::<Self>("ISO-8601 date-time").leaf(
            Element::is_string,
            |element| Ok(NaiveDateTime::parse_from_str(expect_str(element)?, DATE_TIME_FORMAT)?),
            |stamp| Ok(Element::from(stamp.format(DATE_TIME_FORMAT).to_string())),
        )]
    }
}

impl Mapped for DateTime<Utc> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::custom::<Self>("RFC 3339 timestamp").leaf(
            Element::is_string,
            |element| Ok(DateTime::parse_from_rfc3339(expect_str(element)?)?.with_timezone(&Utc)),
            |stamp| Ok(Element::from(stamp.to_rfc3339())),
        )]
    }
}

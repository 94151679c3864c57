//! Record normalization.
//!
//! Field defaulting lives in exactly one place so create, update, and the
//! bulk import paths cannot drift apart. The full table:
//!
//! | field                 | rule                                  |
//! |-----------------------|---------------------------------------|
//! | `zone`                | trimmed                               |
//! | `price`               | negative -> 0                         |
//! | `requirements`        | entries trimmed, empty entries dropped|
//! | `comments`            | trimmed                               |
//! | `link`                | trimmed                               |
//! | `location_link`       | trimmed                               |
//! | `contact`             | trimmed                               |
//! | `appointment`         | non-positive timestamps -> `None`     |
//!
//! Missing values never reach this point: serde defaults fill absent fields
//! with empty strings, empty lists, price 0 and status `New` at decode time.

use crate::record::Prospect;

/// Apply the default table to a record in place.
pub fn normalize(record: &mut Prospect) {
    trim_in_place(&mut record.zone);
    trim_in_place(&mut record.comments);
    trim_in_place(&mut record.link);
    trim_in_place(&mut record.location_link);
    trim_in_place(&mut record.contact);

    if record.price < 0 {
        record.price = 0;
    }

    for req in &mut record.requirements {
        trim_in_place(req);
    }
    record.requirements.retain(|req| !req.is_empty());

    if matches!(record.appointment, Some(ts) if ts <= 0) {
        record.appointment = None;
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

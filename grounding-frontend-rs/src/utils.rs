use chrono::{FixedOffset, NaiveDate, Offset, Utc};

pub fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, we can call the
    // `set_panic_hook` function at least once during initialization, and then
    // we will get better error messages if our code ever panics.
    //
    // For more details see
    // https://github.com/rustwasm/console_error_panic_hook#readme
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// `mm:ss`. Minutes are not capped at 59.
pub fn format_time(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// The browser's current UTC offset. Natively this is always UTC.
pub fn local_offset() -> FixedOffset {
    #[cfg(target_arch = "wasm32")]
    {
        // getTimezoneOffset is minutes *behind* UTC
        let minutes_behind = js_sys::Date::new_0().get_timezone_offset() as i32;
        if let Some(offset) = FixedOffset::west_opt(minutes_behind * 60) {
            return offset;
        }
        log::warn!("Ignoring out of range timezone offset {minutes_behind}");
    }
    Utc.fix()
}

pub fn local_today() -> NaiveDate {
    Utc::now().with_timezone(&local_offset()).date_naive()
}

#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests of the `garage` binary against a temp data directory.

use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;
use tempfile::TempDir;

/// A `garage` command isolated to `home` and signed in as `owner`.
fn garage(home: &Path, owner: &str) -> Result<Command> {
    let mut cmd = Command::cargo_bin("garage")?;
    cmd.env("GARAGE_HOME", home)
        .env("GARAGE_DATA_DIR", home.join("data"))
        .env("GARAGE_OWNER", owner)
        .env_remove("RUST_LOG");
    Ok(cmd)
}

fn json(cmd: &mut Command) -> JsonValue {
    let output = cmd.arg("--json").output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn add_bike(home: &Path, nickname: &str) -> String {
    let bike = json(garage(home, "alice").unwrap().args([
        "bikes", "add", "Honda", "CB500X", "2021", nickname,
    ]));
    bike["id"].as_str().unwrap().to_string()
}

#[test]
fn empty_garage_lists_nothing() -> Result<()> {
    let home = TempDir::new()?;
    garage(home.path(), "alice")?
        .args(["bikes", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No motorcycles yet"));
    Ok(())
}

#[test]
fn added_bike_is_listed_and_selected() -> Result<()> {
    let home = TempDir::new()?;
    let id = add_bike(home.path(), "Red");

    garage(home.path(), "alice")?
        .args(["bikes", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("* {id}  Red  Honda CB500X (2021)")));

    let bikes = json(garage(home.path(), "alice")?.args(["bikes", "list"]));
    assert_eq!(bikes.as_array().map(Vec::len), Some(1));
    assert_eq!(bikes[0]["nickname"], "Red");
    assert_eq!(bikes[0]["photo"], "");
    Ok(())
}

#[test]
fn owners_do_not_see_each_other() -> Result<()> {
    let home = TempDir::new()?;
    add_bike(home.path(), "Red");

    let bikes = json(garage(home.path(), "bob")?.args(["bikes", "list"]));
    assert_eq!(bikes, serde_json::json!([]));
    Ok(())
}

#[test]
fn reminders_follow_the_selected_bike() -> Result<()> {
    let home = TempDir::new()?;
    let red = add_bike(home.path(), "Red");
    let blue = add_bike(home.path(), "Blue");

    let reminder = json(garage(home.path(), "alice")?.args([
        "--bike",
        blue.as_str(),
        "reminders",
        "add",
        "Chain",
        "in 500 km",
    ]));
    assert_eq!(reminder["motorcycleId"], blue.as_str());

    let on_blue = json(garage(home.path(), "alice")?.args(["--bike", blue.as_str(), "reminders", "list"]));
    assert_eq!(on_blue.as_array().map(Vec::len), Some(1));
    let on_red = json(garage(home.path(), "alice")?.args(["--bike", red.as_str(), "reminders", "list"]));
    assert_eq!(on_red, serde_json::json!([]));

    let id = reminder["id"].as_str().unwrap();
    garage(home.path(), "alice")?
        .args(["--bike", blue.as_str(), "reminders", "rm", id])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Deleted reminders {id}")));
    let on_blue = json(garage(home.path(), "alice")?.args(["--bike", blue.as_str(), "reminders", "list"]));
    assert_eq!(on_blue, serde_json::json!([]));
    Ok(())
}

#[test]
fn service_logs_are_newest_first() -> Result<()> {
    let home = TempDir::new()?;
    add_bike(home.path(), "Red");
    for (date, mileage) in [("2024-01-10", "4000"), ("2024-03-01", "5000"), ("2023-07-15", "2000")] {
        garage(home.path(), "alice")?
            .args(["services", "add", "--date", date, "--mileage", mileage, "--type", "Oil change"])
            .assert()
            .success();
    }

    let logs = json(garage(home.path(), "alice")?.args(["services", "list"]));
    let dates: Vec<&str> = logs
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates, vec!["2024-03-01", "2024-01-10", "2023-07-15"]);
    Ok(())
}

#[test]
fn tech_data_round_trip_through_files() -> Result<()> {
    let home = TempDir::new()?;
    add_bike(home.path(), "Red");
    garage(home.path(), "alice")?
        .args(["tech", "add", "Tyre pressure", "2.5 bar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tyre pressure: 2.5 bar"));

    garage(home.path(), "alice")?
        .args(["tech", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tech data for Red:"))
        .stdout(predicate::str::contains("Tyre pressure: 2.5 bar"));
    Ok(())
}

#[test]
fn dependents_need_a_bike() -> Result<()> {
    let home = TempDir::new()?;
    garage(home.path(), "alice")?
        .args(["reminders", "add", "Chain", "in 500 km"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No motorcycle selected"));
    Ok(())
}

#[test]
fn unknown_bike_is_rejected() -> Result<()> {
    let home = TempDir::new()?;
    add_bike(home.path(), "Red");
    garage(home.path(), "alice")?
        .args(["--bike", "nope", "reminders", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown motorcycle: nope"));
    Ok(())
}

#[test]
fn missing_owner_is_an_error() -> Result<()> {
    let home = TempDir::new()?;
    let mut cmd = Command::cargo_bin("garage")?;
    cmd.env("GARAGE_HOME", home.path())
        .env("GARAGE_DATA_DIR", home.path().join("data"))
        .env_remove("GARAGE_OWNER")
        .args(["bikes", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No owner configured"));
    Ok(())
}

#[test]
fn unreadable_photo_creates_nothing() -> Result<()> {
    let home = TempDir::new()?;
    let photo = home.path().join("bike.jpg");
    std::fs::write(&photo, b"not really a jpeg")?;

    garage(home.path(), "alice")?
        .args(["bikes", "add", "Honda", "CB500X", "2021", "Red", "--photo"])
        .arg(&photo)
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not process the image, please try again"));

    let bikes = json(garage(home.path(), "alice")?.args(["bikes", "list"]));
    assert_eq!(bikes, serde_json::json!([]));
    Ok(())
}

#[test]
fn status_reports_config_file_settings() -> Result<()> {
    let home = TempDir::new()?;
    std::fs::write(
        home.path().join("config.toml"),
        "[image]\nmax_dimension = 640\n",
    )?;
    add_bike(home.path(), "Red");

    let status = json(garage(home.path(), "alice")?.arg("status"));
    assert_eq!(status["owner"], "alice");
    assert_eq!(status["motorcycles"], 1);
    assert_eq!(status["image"]["max_dimension"], 640);
    assert_eq!(status["image"]["max_size_bytes"], 1024 * 1024);
    Ok(())
}

use axum::{Form, debug_handler, extract::State, http::StatusCode, response::{Html, IntoResponse, Redirect, Response}};
use serde::Deserialize;

use crate::{AppResult, AppState, db::{DataError, Db, NewPin}, include_res, res::{self, escape, render}, session::CurrentUser};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CreateForm {
    image_url: String,
    width: String,
    height: String,
    title: String,
    description: String,
}

fn dimension(value: &str, name: &str) -> Result<Option<u32>, DataError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| DataError::Validation(format!("{name} must be a whole number")))
}

impl CreateForm {
    fn to_new_pin(&self) -> Result<NewPin, DataError> {
        let text = |s: &str| Some(s.to_owned()).filter(|s| !s.trim().is_empty());
        Ok(NewPin {
            image_url: text(&self.image_url),
            title: text(&self.title),
            description: text(&self.description),
            width: dimension(&self.width, "width")?,
            height: dimension(&self.height, "height")?,
        })
    }
}

fn create_html(form: &CreateForm, alert: Option<&str>) -> Html<String> {
    let body = render(
        include_res!(str, "/pages/create.html"),
        &[
            ("alert", res::alert(alert).as_str()),
            ("image_url", escape(&form.image_url).as_str()),
            ("width", escape(&form.width).as_str()),
            ("height", escape(&form.height).as_str()),
            ("title", escape(&form.title).as_str()),
            ("description", escape(&form.description).as_str()),
        ],
    );
    res::page("Create a pin", true, &body)
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_page(CurrentUser(_): CurrentUser) -> Html<String> {
    create_html(&CreateForm::default(), None)
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    CurrentUser(user): CurrentUser,
    State(db): State<Db>,
    Form(form): Form<CreateForm>,
) -> AppResult<Response> {
    let created = match form.to_new_pin() {
        Ok(new_pin) => db.create_pin(user.user_id, new_pin).await,
        Err(err) => Err(err),
    };

    match created {
        Ok(pin) => {
            Ok(Redirect::to(&format!("/pin/{}", pin.id)).into_response())
        }
        Err(err) if err.is_user_facing() => {
            Ok((StatusCode::UNPROCESSABLE_ENTITY, create_html(&form, Some(&err.to_string()))).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

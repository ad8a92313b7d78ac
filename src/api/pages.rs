//! HTML shells for the login and admin views
//!
//! Both pages are static; all data flows through the JSON endpoints.

use axum::response::Html;

/// GET {admin_path} - Admin shell
pub async fn admin_shell() -> Html<&'static str> {
    Html(ADMIN_PAGE)
}

pub const LOGIN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Sign in</title>
</head>
<body>
<main>
  <h1>Admin sign in</h1>
  <form id="login">
    <label>Email <input name="email" type="email" required></label>
    <label>Password <input name="password" type="password" required></label>
    <button type="submit">Sign in</button>
  </form>
  <p id="error" role="alert"></p>
</main>
<script>
document.getElementById('login').addEventListener('submit', async (event) => {
  event.preventDefault();
  const form = new FormData(event.target);
  const response = await fetch(window.location.pathname, {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    credentials: 'same-origin',
    body: JSON.stringify({ email: form.get('email'), password: form.get('password') }),
  });
  const body = await response.json();
  if (response.ok) {
    window.location.assign(body.redirect);
  } else {
    document.getElementById('error').textContent = body.error.message;
  }
});
</script>
</body>
</html>
"#;

pub const ADMIN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Admin</title>
</head>
<body>
<header>
  <h1>Admin</h1>
  <form method="post" action="admin/logout"><button type="submit">Sign out</button></form>
</header>
<main>
  <section><h2>Blog posts</h2><p class="error" data-for="blogs"></p><ul id="blogs"></ul></section>
  <section><h2>Projects</h2><p class="error" data-for="projects"></p><ul id="projects"></ul></section>
  <section><h2>Contact requests</h2><p class="error" data-for="contacts"></p><ul id="contacts"></ul></section>
</main>
<script>
const base = window.location.pathname.replace(/\/$/, '') + '/api';

async function load(entity, describe) {
  const response = await fetch(`${base}/${entity}`, { credentials: 'same-origin' });
  const body = await response.json();
  document.querySelector(`[data-for="${entity}"]`).textContent = body.error || '';
  const list = document.getElementById(entity);
  list.replaceChildren(...body.records.map((record) => {
    const item = document.createElement('li');
    item.textContent = describe(record);
    const remove = document.createElement('button');
    remove.textContent = 'Delete';
    remove.addEventListener('click', async () => {
      await fetch(`${base}/${entity}/${record.id}`, { method: 'DELETE', credentials: 'same-origin' });
      load(entity, describe);
    });
    item.append(' ', remove);
    return item;
  }));
}

load('blogs', (post) => `${post.title} (/${post.slug})`);
load('projects', (project) => `${project.title}, ${project.location}`);
load('contacts', (request) => `${request.name} <${request.email}>: ${request.service} [${request.status}]`);
</script>
</body>
</html>
"#;

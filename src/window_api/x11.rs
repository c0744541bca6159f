use anyhow::Result;
use sysinfo::Pid;
use tracing::{error, instrument};
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{self, Atom, Drawable, GetProperty, GrabServer, InternAtom, UngrabServer, Window, ATOM_ANY},
    Connection,
};

use super::{exe_basename, ForegroundApp, SystemProbe};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_window_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    let result_slice = result.value::<u32>();
    if result_slice.is_empty() {
        return Ok(None);
    }
    Ok(Some(result_slice[0]))
}

fn get_exe_path(id: u32) -> Option<String> {
    let system = sysinfo::System::new_all();
    let process = system.process(Pid::from_u32(id))?;
    process
        .exe()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<Window>()[0])
}

fn get_window_title(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).to_string())
}

pub struct X11Probe {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
}

impl X11Probe {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            window_name_atom,
            pid_atom,
        })
    }

    fn root_window(&self) -> Result<Window> {
        let setup = self.connection.get_setup();
        // Currently the application only supports 1 x11 screen.
        setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow::anyhow!("Preferred x11 screen is gone"))
    }

    #[instrument(skip(self))]
    fn read_foreground(&self) -> Result<ForegroundApp> {
        let root = self.root_window()?;
        let active_window = get_active_window(&self.connection, &root, self.active_window_atom)?;
        let window_title = get_window_title(&self.connection, active_window, self.window_name_atom)?;

        let Some(pid) = get_window_pid(&self.connection, active_window, self.pid_atom)? else {
            return Ok(ForegroundApp {
                process_name: "Unknown".into(),
                window_title,
                exe_path: String::new(),
            });
        };
        let Some(exe_path) = get_exe_path(pid) else {
            return Ok(ForegroundApp {
                process_name: "Unknown".into(),
                window_title,
                exe_path: String::new(),
            });
        };

        Ok(ForegroundApp {
            process_name: exe_basename(&exe_path),
            window_title,
            exe_path,
        })
    }

    #[instrument(skip(self))]
    fn read_idle_seconds(&self) -> Result<i64> {
        let root = self.root_window()?;
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(idle)?;
        Ok((reply.ms_since_user_input() / 1000) as i64)
    }
}

impl SystemProbe for X11Probe {
    fn foreground_app(&mut self) -> ForegroundApp {
        let _ = self.connection.send_request(&GrabServer {});
        let result = self.read_foreground();
        let _ = self.connection.send_request(&UngrabServer {});
        match result {
            Ok(v) => v,
            Err(e) => {
                error!("Falling back to a placeholder observation {e:?}");
                ForegroundApp::unknown()
            }
        }
    }

    fn idle_seconds(&mut self) -> i64 {
        match self.read_idle_seconds() {
            Ok(v) => v,
            Err(e) => {
                error!("Treating idle time as zero {e:?}");
                0
            }
        }
    }
}
